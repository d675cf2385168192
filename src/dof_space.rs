//! The coarse (interface) space and the duplicated DOF space used by BDDC.
//!
//! The duplicated space consists of the coarse DOFs followed by, for each element in order,
//! a contiguous block of private copies of the element's interior DOFs. A non-interface DOF
//! shared by `k` elements therefore appears `k` times, while every interface DOF appears
//! exactly once.
use crate::reduced::split_into_chunks;
use crate::topology::DofNumbering;
use nalgebra::{DVectorView, DVectorViewMut};
use std::ops::Range;

/// How the slots of a single element map into the coarse and duplicated spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementLayout {
    num_slots: usize,
    interface_slots: Vec<usize>,
    interface_coarse: Vec<usize>,
    interior_slots: Vec<usize>,
    interior_dofs: Vec<usize>,
    interior_offset: Option<usize>,
}

impl ElementLayout {
    /// Number of rows (and columns) of the element matrix, including unused slots.
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Slots whose DOF is an interface DOF.
    pub fn interface_slots(&self) -> &[usize] {
        &self.interface_slots
    }

    /// Coarse index of the DOF of each interface slot.
    pub fn interface_coarse(&self) -> &[usize] {
        &self.interface_coarse
    }

    /// Slots whose DOF is used but not an interface DOF.
    pub fn interior_slots(&self) -> &[usize] {
        &self.interior_slots
    }

    /// Global DOF of each interior slot.
    pub fn interior_dofs(&self) -> &[usize] {
        &self.interior_dofs
    }

    /// Indices of the private interior copies in the duplicated space.
    ///
    /// `None` if interior DOFs are not duplicated.
    pub fn interior_range(&self) -> Option<Range<usize>> {
        self.interior_offset
            .map(|offset| offset..offset + self.interior_slots.len())
    }

    pub fn slot_counts(&self) -> (usize, usize) {
        (self.interface_slots.len(), self.interior_slots.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatedDofSpace {
    num_dofs: usize,
    coarse_index: Vec<Option<usize>>,
    interface_dofs: Vec<usize>,
    restrict: Vec<Option<usize>>,
    multiplicity: Vec<usize>,
    elements: Vec<ElementLayout>,
}

impl DuplicatedDofSpace {
    /// Build the coarse space and, if `duplicate_interior` is set, private interior copies
    /// for every element.
    ///
    /// Without interior duplication the duplicated space coincides with the coarse space.
    ///
    /// # Panics
    ///
    /// Panics if the numbering reports a DOF that is out of bounds.
    pub fn build(dofs: &dyn DofNumbering, duplicate_interior: bool) -> Self {
        let num_dofs = dofs.num_dofs();
        let mut coarse_index = vec![None; num_dofs];
        let mut interface_dofs = Vec::new();
        for dof in 0..num_dofs {
            if dofs.is_interface_dof(dof) {
                coarse_index[dof] = Some(interface_dofs.len());
                interface_dofs.push(dof);
            }
        }
        let num_coarse = interface_dofs.len();

        let mut restrict = vec![None; num_coarse];
        let mut elements = Vec::with_capacity(dofs.num_elements());
        let mut element_dofs = Vec::new();
        for element_index in 0..dofs.num_elements() {
            let num_slots = dofs.element_dof_count(element_index);
            element_dofs.clear();
            element_dofs.resize(num_slots, None);
            dofs.populate_element_dofs(&mut element_dofs, element_index);

            let mut layout = ElementLayout {
                num_slots,
                interface_slots: Vec::new(),
                interface_coarse: Vec::new(),
                interior_slots: Vec::new(),
                interior_dofs: Vec::new(),
                interior_offset: None,
            };
            for (slot, dof) in element_dofs.iter().enumerate() {
                if let Some(dof) = *dof {
                    assert!(dof < num_dofs, "Element DOF {} out of bounds", dof);
                    match coarse_index[dof] {
                        Some(coarse) => {
                            layout.interface_slots.push(slot);
                            layout.interface_coarse.push(coarse);
                            restrict[coarse] = Some(dof);
                        }
                        None => {
                            layout.interior_slots.push(slot);
                            layout.interior_dofs.push(dof);
                        }
                    }
                }
            }

            if duplicate_interior {
                layout.interior_offset = Some(restrict.len());
                restrict.extend(layout.interior_dofs.iter().copied().map(Some));
            }
            elements.push(layout);
        }

        let mut multiplicity = vec![0; num_dofs];
        for dof in restrict.iter().flatten() {
            multiplicity[*dof] += 1;
        }

        Self {
            num_dofs,
            coarse_index,
            interface_dofs,
            restrict,
            multiplicity,
            elements,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Number of interface DOFs, which are the first entries of the duplicated space.
    pub fn num_coarse(&self) -> usize {
        self.interface_dofs.len()
    }

    /// Dimension of the duplicated space.
    pub fn len(&self) -> usize {
        self.restrict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restrict.is_empty()
    }

    /// Original DOF of every duplicated index.
    ///
    /// Coarse DOFs that are not referenced by any element are `None`.
    pub fn restrict(&self) -> &[Option<usize>] {
        &self.restrict
    }

    /// Number of duplicated indices that restrict to each DOF.
    pub fn multiplicity(&self) -> &[usize] {
        &self.multiplicity
    }

    /// Global DOF of every coarse index.
    pub fn interface_dofs(&self) -> &[usize] {
        &self.interface_dofs
    }

    pub fn coarse_index(&self, dof: usize) -> Option<usize> {
        self.coarse_index[dof]
    }

    pub fn elements(&self) -> &[ElementLayout] {
        &self.elements
    }

    /// Compute `lx[k] = x[restrict[k]] / multiplicity[restrict[k]]`.
    ///
    /// Entries without an original DOF are set to zero.
    pub fn restrict_into(&self, x: DVectorView<f64>, mut lx: DVectorViewMut<f64>) {
        assert_eq!(x.len(), self.num_dofs);
        assert_eq!(lx.len(), self.len());
        for (lx_k, dof) in lx.iter_mut().zip(&self.restrict) {
            *lx_k = match *dof {
                Some(dof) => x[dof] / self.multiplicity[dof] as f64,
                None => 0.0,
            };
        }
    }

    /// Compute `y[restrict[k]] += scale * ly[k] / multiplicity[restrict[k]]`.
    pub fn extend_add(&self, scale: f64, ly: DVectorView<f64>, mut y: DVectorViewMut<f64>) {
        assert_eq!(ly.len(), self.len());
        assert_eq!(y.len(), self.num_dofs);
        for (ly_k, dof) in ly.iter().zip(&self.restrict) {
            if let Some(dof) = *dof {
                y[dof] += scale * ly_k / self.multiplicity[dof] as f64;
            }
        }
    }

    /// Split a vector over the duplicated space into its coarse part and the private
    /// interior blocks of every element.
    ///
    /// # Panics
    ///
    /// Panics if interior DOFs are not duplicated or the slice has the wrong length.
    pub fn split_interior_mut<'a>(&self, values: &'a mut [f64]) -> (&'a mut [f64], Vec<&'a mut [f64]>) {
        assert_eq!(values.len(), self.len());
        let (coarse, interior) = values.split_at_mut(self.num_coarse());
        let lengths = self.elements.iter().map(|layout| {
            layout
                .interior_range()
                .expect("Interior DOFs must be duplicated")
                .len()
        });
        (coarse, split_into_chunks(interior, lengths))
    }
}
