use crate::condensation::LocalCondensation;
use crate::dof_space::DuplicatedDofSpace;
use crate::error::PreconditionerError;
use crate::factorization::{FactoredSystem, SparseFactorization};
use crate::reduced::{split_into_chunks, Incidence, ReducedSystem};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use rayon::prelude::*;
use std::cell::RefCell;
use std::sync::Arc;
use thread_local::ThreadLocal;

/// The BDDC operator on the duplicated DOF space.
///
/// With $R$ the weighted restriction to the duplicated space, the operator computes
/// $y \gets y + \alpha R^T \tilde{P} R x$, where $\tilde{P}$ folds the interior values into the
/// interface, solves the reduced system and extends the interface solution back into the
/// element interiors.
#[derive(Debug)]
pub(crate) struct BddcOperator {
    pub space: DuplicatedDofSpace,
    pub reduced: ReducedSystem,
    factor: Box<dyn FactoredSystem>,
    condensations: Vec<Arc<LocalCondensation>>,
    interface_incidence: Incidence,
    /// Start of every element's interface block in the flat correction buffer.
    interface_offsets: Vec<usize>,
    interface_values: ThreadLocal<RefCell<DVector<f64>>>,
}

impl BddcOperator {
    pub fn build(
        space: DuplicatedDofSpace,
        reduced: ReducedSystem,
        condensations: Vec<Arc<LocalCondensation>>,
        factorization: &dyn SparseFactorization,
    ) -> Result<Self, PreconditionerError> {
        assert_eq!(condensations.len(), space.elements().len());
        let factor = factorization.factor(&reduced)?;
        assert_eq!(factor.dim(), space.num_coarse(), "Factorization must match the coarse space.");
        let interface_incidence = Incidence::from_element_rows(
            space.num_coarse(),
            space.elements().iter().map(|layout| layout.interface_coarse()),
        );
        let interface_offsets = space
            .elements()
            .iter()
            .scan(0, |offset, layout| {
                let start = *offset;
                *offset += layout.interface_coarse().len();
                Some(start)
            })
            .collect();
        Ok(Self {
            space,
            reduced,
            factor,
            condensations,
            interface_incidence,
            interface_offsets,
            interface_values: ThreadLocal::new(),
        })
    }

    pub fn condensations(&self) -> &[Arc<LocalCondensation>] {
        &self.condensations
    }

    pub fn apply_add(&self, scale: f64, x: DVectorView<f64>, y: DVectorViewMut<f64>) {
        let space = &self.space;
        let num_coarse = space.num_coarse();
        let mut lx = DVector::zeros(space.len());
        space.restrict_into(x, DVectorViewMut::from(&mut lx));

        // Interior contributions F_e lx_dc to the interface, stored back to back per element
        let total_interface: usize = space
            .elements()
            .iter()
            .map(|layout| layout.interface_coarse().len())
            .sum();
        let mut corrections = vec![0.0; total_interface];
        split_into_chunks(
            &mut corrections,
            space.elements().iter().map(|layout| layout.interface_coarse().len()),
        )
        .into_par_iter()
        .zip(space.elements())
        .zip(&self.condensations)
        .for_each(|((correction, layout), condensation)| {
            let range = interior_range(layout.interior_range());
            let len = correction.len();
            let mut correction = DVectorViewMut::from_slice(correction, len);
            correction.gemv(1.0, &condensation.lifting, &lx.rows(range.start, range.len()), 0.0);
        });

        // Every coarse row sums the corrections of its elements in element order
        let incidence = &self.interface_incidence;
        let offsets = &self.interface_offsets;
        let corrections = &corrections;
        lx.as_mut_slice()[..num_coarse]
            .par_iter_mut()
            .enumerate()
            .for_each(|(row, lx_wb)| {
                for &(element_index, k) in incidence.row(row) {
                    *lx_wb -= corrections[offsets[element_index] + k];
                }
            });

        let mut ly = DVector::zeros(space.len());
        self.factor
            .solve_into(lx.rows(0, num_coarse), ly.rows_mut(0, num_coarse));

        let (ly_wb, ly_interior) = space.split_interior_mut(ly.as_mut_slice());
        let ly_wb: &[f64] = ly_wb;
        ly_interior
            .into_par_iter()
            .zip(space.elements())
            .zip(&self.condensations)
            .for_each(|((ly_dc, layout), condensation)| {
                let range = interior_range(layout.interior_range());
                let lx_dc = lx.rows(range.start, range.len());
                let mut local_wb = self
                    .interface_values
                    .get_or(|| RefCell::new(DVector::zeros(0)))
                    .borrow_mut();
                local_wb.resize_vertically_mut(layout.interface_coarse().len(), 0.0);
                for (value, &coarse) in local_wb.iter_mut().zip(layout.interface_coarse()) {
                    *value = ly_wb[coarse];
                }

                let len = ly_dc.len();
                let mut ly_dc = DVectorViewMut::from_slice(ly_dc, len);
                ly_dc.gemv(1.0, &condensation.interior_inverse, &lx_dc, 0.0);
                ly_dc.gemv(-1.0, &condensation.extension, &*local_wb, 1.0);
            });

        space.extend_add(scale, DVectorView::from(&ly), y);
    }
}

fn interior_range(range: Option<std::ops::Range<usize>>) -> std::ops::Range<usize> {
    range.expect("Internal error: BDDC requires duplicated interior DOFs")
}
