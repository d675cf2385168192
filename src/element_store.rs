//! Storage of dense element matrices with their global DOF indices.
use crate::condensation::try_invert_dense;
use crate::error::PreconditionerError;
use crate::operator::LinearOperator;
use crate::topology::{ElementMatrixProvider, LocalMatrix, LocalMatrixAccess};
use itertools::Itertools;
use nalgebra::{ComplexField, DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use std::error::Error;

/// A global matrix represented as a sum of element contributions $\sum_e P_e^T K_e P_e$.
///
/// The global matrix is never formed. Every element is stored with its list of global DOFs
/// and a dense matrix whose rows and columns follow that list.
///
/// The store works with real and complex scalars. The preconditioners consume real-valued
/// stores only.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMatrixStore<T: ComplexField = f64> {
    num_dofs: usize,
    element_dofs: Vec<Vec<usize>>,
    element_matrices: Vec<DMatrix<T>>,
}

impl<T: ComplexField> ElementMatrixStore<T> {
    /// A store for `num_elements` elements, all initially empty.
    pub fn new(num_dofs: usize, num_elements: usize) -> Self {
        Self {
            num_dofs,
            element_dofs: vec![Vec::new(); num_elements],
            element_matrices: vec![DMatrix::zeros(0, 0); num_elements],
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_elements(&self) -> usize {
        self.element_dofs.len()
    }

    /// Store the matrix of an element, replacing whatever was stored before.
    ///
    /// Rows and columns whose DOF is `None` are dropped. The remaining ones keep their
    /// relative order.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not square with dimension `dofs.len()`, or if a DOF is out
    /// of bounds.
    pub fn set<'a>(
        &mut self,
        element_index: usize,
        dofs: &[Option<usize>],
        matrix: impl Into<DMatrixView<'a, T>>,
    ) -> Result<(), PreconditionerError> {
        let matrix = matrix.into();
        assert_eq!(matrix.nrows(), dofs.len(), "Matrix rows must match number of DOFs.");
        assert_eq!(matrix.ncols(), dofs.len(), "Matrix columns must match number of DOFs.");

        let num_elements = self.num_elements();
        if element_index >= num_elements {
            return Err(PreconditionerError::ElementIndexOutOfBounds {
                element_index,
                num_elements,
            });
        }

        let used_slots: Vec<usize> = dofs.iter().positions(Option::is_some).collect();
        let global_dofs: Vec<usize> = dofs.iter().flatten().copied().collect();
        assert!(
            global_dofs.iter().all(|&dof| dof < self.num_dofs),
            "Element DOFs must be in bounds."
        );

        let local = DMatrix::from_fn(used_slots.len(), used_slots.len(), |i, j| {
            matrix[(used_slots[i], used_slots[j])].clone()
        });
        self.element_dofs[element_index] = global_dofs;
        self.element_matrices[element_index] = local;
        Ok(())
    }

    pub fn element_dofs(&self, element_index: usize) -> &[usize] {
        &self.element_dofs[element_index]
    }

    pub fn element_matrix(&self, element_index: usize) -> &DMatrix<T> {
        &self.element_matrices[element_index]
    }

    /// Compute $y \gets y + \alpha \sum_e P_e^T K_e P_e x$.
    pub fn apply_add<'a, 'b>(
        &self,
        scale: T,
        x: impl Into<DVectorView<'a, T>>,
        y: impl Into<DVectorViewMut<'b, T>>,
    ) {
        let x = x.into();
        let mut y = y.into();
        assert_eq!(x.len(), self.num_dofs, "x must have one entry per DOF.");
        assert_eq!(y.len(), self.num_dofs, "y must have one entry per DOF.");

        let mut local_x = DVector::zeros(0);
        let mut local_y = DVector::zeros(0);
        for (dofs, matrix) in self.element_dofs.iter().zip(&self.element_matrices) {
            if dofs.is_empty() {
                continue;
            }
            local_x.resize_vertically_mut(dofs.len(), T::zero());
            local_y.resize_vertically_mut(dofs.len(), T::zero());
            for (local, &dof) in local_x.iter_mut().zip(dofs) {
                *local = x[dof].clone();
            }
            local_y.gemv(T::one(), matrix, &local_x, T::zero());
            for (local, &dof) in local_y.iter().zip(dofs) {
                y[dof] += scale.clone() * local.clone();
            }
        }
    }

    /// A store with the same shape, where every element matrix is replaced by its inverse.
    ///
    /// Elements are inverted independently of each other, so the result is in general not
    /// the inverse of the global matrix.
    pub fn inverse_by_element(&self, tolerance: T::RealField) -> Result<Self, PreconditionerError> {
        let element_matrices = self
            .element_matrices
            .iter()
            .enumerate()
            .map(|(element_index, matrix)| {
                try_invert_dense(matrix.clone(), tolerance.clone())
                    .ok_or(PreconditionerError::SingularLocalBlock { element_index })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            num_dofs: self.num_dofs,
            element_dofs: self.element_dofs.clone(),
            element_matrices,
        })
    }

    /// Assemble the dense global matrix. Intended for diagnostics on small problems.
    pub fn to_dense(&self) -> DMatrix<T> {
        let mut global = DMatrix::zeros(self.num_dofs, self.num_dofs);
        for (dofs, matrix) in self.element_dofs.iter().zip(&self.element_matrices) {
            for (i, &row) in dofs.iter().enumerate() {
                for (j, &col) in dofs.iter().enumerate() {
                    global[(row, col)] += matrix[(i, j)].clone();
                }
            }
        }
        global
    }
}

impl LocalMatrixAccess for ElementMatrixStore {
    fn num_global_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_local_matrices(&self) -> usize {
        self.num_elements()
    }

    fn local_matrix(&self, element_index: usize) -> Option<LocalMatrix<'_>> {
        let dofs = self.element_dofs.get(element_index)?;
        let matrix = self.element_matrices.get(element_index)?;
        Some(LocalMatrix {
            dofs,
            matrix: DMatrixView::from(matrix),
        })
    }
}

impl ElementMatrixProvider for ElementMatrixStore {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let matrix = self
            .element_matrices
            .get(element_index)
            .ok_or_else(|| eyre::eyre!("Element index {} out of bounds", element_index))?;
        if output.shape() != matrix.shape() {
            eyre::bail!(
                "Output of shape {:?} does not match stored matrix of shape {:?} for element {}",
                output.shape(),
                matrix.shape(),
                element_index
            );
        }
        output.copy_from(matrix);
        Ok(())
    }
}

impl<T: ComplexField> LinearOperator<T> for ElementMatrixStore<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.fill(T::zero());
        self.apply_add(T::one(), x, y);
        Ok(())
    }
}
