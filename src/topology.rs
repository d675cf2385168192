//! Narrow query interfaces to the mesh, the DOF numbering and the element matrices.
//!
//! The preconditioners never look at geometry or basis functions. Everything they need is
//! obtained through the traits in this module.
use crate::error::PreconditionerError;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut};

/// Element-to-vertex queries.
///
/// Only the vertex numbers are needed, and only to compute element classes for the
/// [`ElementClassCache`](crate::class_cache::ElementClassCache).
pub trait MeshTopology {
    fn num_elements(&self) -> usize;

    fn element_vertices(&self, element_index: usize) -> &[usize];
}

impl MeshTopology for Vec<Vec<usize>> {
    fn num_elements(&self) -> usize {
        self.len()
    }

    fn element_vertices(&self, element_index: usize) -> &[usize] {
        &self[element_index]
    }
}

impl<const N: usize> MeshTopology for Vec<[usize; N]> {
    fn num_elements(&self) -> usize {
        self.len()
    }

    fn element_vertices(&self, element_index: usize) -> &[usize] {
        &self[element_index]
    }
}

/// Global DOF numbering of a finite element space.
///
/// Every element has an ordered list of DOFs, one per row/column of its element matrix.
/// Slots that are not used by the space are `None`.
pub trait DofNumbering {
    fn num_dofs(&self) -> usize;

    fn num_elements(&self) -> usize;

    fn element_dof_count(&self, element_index: usize) -> usize;

    fn populate_element_dofs(&self, output: &mut [Option<usize>], element_index: usize);

    /// Whether the DOF belongs to the globally coupled interface (wirebasket) set.
    fn is_interface_dof(&self, dof: usize) -> bool;

    fn populate_element_interface_dofs(&self, output: &mut Vec<usize>, element_index: usize) {
        let mut dofs = vec![None; self.element_dof_count(element_index)];
        self.populate_element_dofs(&mut dofs, element_index);
        output.clear();
        output.extend(
            dofs.into_iter()
                .flatten()
                .filter(|&dof| self.is_interface_dof(dof)),
        );
    }
}

/// Produces dense element matrices.
///
/// The ordering of rows and columns must match [`DofNumbering::populate_element_dofs`].
pub trait ElementMatrixProvider {
    /// Assemble the element matrix into `output`.
    ///
    /// The output is zeroed and has dimensions `n x n`, where `n` is the
    /// [element DOF count](DofNumbering::element_dof_count).
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<f64>) -> eyre::Result<()>;
}

/// A stored local matrix together with its global DOF indices.
#[derive(Debug, Clone, Copy)]
pub struct LocalMatrix<'a> {
    pub dofs: &'a [usize],
    pub matrix: DMatrixView<'a, f64>,
}

/// Direct access to stored element matrices.
///
/// This is a capability: only types that actually keep element matrices around implement it,
/// and consumers ask for it explicitly instead of inspecting a generic matrix handle.
pub trait LocalMatrixAccess {
    fn num_global_dofs(&self) -> usize;

    fn num_local_matrices(&self) -> usize;

    /// Returns `None` if the element index is out of bounds.
    fn local_matrix(&self, element_index: usize) -> Option<LocalMatrix<'_>>;
}

/// A DOF numbering stored as a flat table of element DOFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofTable {
    num_dofs: usize,
    offsets: Vec<usize>,
    dofs: Vec<Option<usize>>,
    interface: Vec<bool>,
}

impl DofTable {
    /// Creates a table from element DOF lists and per-DOF interface flags.
    ///
    /// # Panics
    ///
    /// Panics if `interface.len() != num_dofs` or if any DOF is out of bounds.
    pub fn from_element_dofs<E>(num_dofs: usize, element_dofs: &[E], interface: Vec<bool>) -> Self
    where
        E: AsRef<[Option<usize>]>,
    {
        assert_eq!(interface.len(), num_dofs, "Need exactly one interface flag per DOF.");
        let mut offsets = Vec::with_capacity(element_dofs.len() + 1);
        let mut dofs = Vec::new();
        offsets.push(0);
        for element in element_dofs {
            let element = element.as_ref();
            assert!(
                element.iter().flatten().all(|&dof| dof < num_dofs),
                "Element DOFs must be in bounds."
            );
            dofs.extend_from_slice(element);
            offsets.push(dofs.len());
        }
        Self {
            num_dofs,
            offsets,
            dofs,
            interface,
        }
    }

    /// Creates a table matching the stored local matrices, with the interface set given by a predicate.
    pub fn from_local_matrices(access: &dyn LocalMatrixAccess, is_interface: impl Fn(usize) -> bool) -> Self {
        let element_dofs: Vec<Vec<Option<usize>>> = (0..access.num_local_matrices())
            .map(|i| {
                access
                    .local_matrix(i)
                    .map(|local| local.dofs.iter().copied().map(Some).collect())
                    .unwrap_or_default()
            })
            .collect();
        let num_dofs = access.num_global_dofs();
        let interface = (0..num_dofs).map(is_interface).collect();
        Self::from_element_dofs(num_dofs, &element_dofs, interface)
    }

    pub fn element_dofs(&self, element_index: usize) -> &[Option<usize>] {
        &self.dofs[self.offsets[element_index]..self.offsets[element_index + 1]]
    }

    pub fn interface_flags(&self) -> &[bool] {
        &self.interface
    }
}

impl DofNumbering for DofTable {
    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_elements(&self) -> usize {
        self.offsets.len() - 1
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.offsets[element_index + 1] - self.offsets[element_index]
    }

    fn populate_element_dofs(&self, output: &mut [Option<usize>], element_index: usize) {
        output.copy_from_slice(self.element_dofs(element_index));
    }

    fn is_interface_dof(&self, dof: usize) -> bool {
        self.interface[dof]
    }
}

/// Resize and zero `buffer`, then let the provider fill it with the matrix of the given element.
pub(crate) fn assemble_element_matrix(
    matrices: &(dyn Sync + ElementMatrixProvider),
    element_index: usize,
    dof_count: usize,
    buffer: &mut DMatrix<f64>,
) -> Result<(), PreconditionerError> {
    buffer.resize_mut(dof_count, dof_count, 0.0);
    buffer.fill(0.0);
    matrices
        .assemble_element_matrix_into(element_index, DMatrixViewMut::from(&mut *buffer))
        .map_err(|source| PreconditionerError::ElementMatrixAssembly { element_index, source })
}
