//! Assembly of the reduced system from condensed element matrices.
use crate::condensation::{condense, schur_complement, LocalCondensation, DEFAULT_SINGULARITY_TOLERANCE};
use crate::dof_space::{DuplicatedDofSpace, ElementLayout};
use crate::error::PreconditionerError;
use crate::options::MatrixStorage;
use crate::reduced::{ElementContribution, ReducedSystem};
use crate::topology::{assemble_element_matrix, ElementMatrixProvider};
use log::debug;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::borrow::Borrow;
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// Condenses the interior DOFs out of every element and accumulates the resulting
/// Schur complements into a [`ReducedSystem`] over the interface DOFs.
///
/// Elements are condensed in parallel. Each worker thread reuses its own buffer for
/// element matrices.
#[derive(Debug)]
pub struct InterfaceSchurAssembler {
    storage: MatrixStorage,
    singularity_tolerance: f64,
    element_matrix: ThreadLocal<RefCell<DMatrix<f64>>>,
}

impl Default for InterfaceSchurAssembler {
    fn default() -> Self {
        Self::new(MatrixStorage::Symmetric)
    }
}

impl InterfaceSchurAssembler {
    pub fn new(storage: MatrixStorage) -> Self {
        Self {
            storage,
            singularity_tolerance: DEFAULT_SINGULARITY_TOLERANCE,
            element_matrix: ThreadLocal::new(),
        }
    }

    pub fn with_singularity_tolerance(self, singularity_tolerance: f64) -> Self {
        Self {
            singularity_tolerance,
            ..self
        }
    }

    pub fn storage(&self) -> MatrixStorage {
        self.storage
    }

    fn with_element_matrix<R>(
        &self,
        matrices: &(dyn Sync + ElementMatrixProvider),
        element_index: usize,
        layout: &ElementLayout,
        f: impl FnOnce(&DMatrix<f64>) -> Result<R, PreconditionerError>,
    ) -> Result<R, PreconditionerError> {
        let buffer = self
            .element_matrix
            .get_or(|| RefCell::new(DMatrix::zeros(0, 0)));
        let buffer = &mut *buffer.borrow_mut();
        assemble_element_matrix(matrices, element_index, layout.num_slots(), buffer)?;
        f(buffer)
    }

    /// The Schur complement of a single element on its interface slots.
    pub fn element_schur_complement(
        &self,
        matrices: &(dyn Sync + ElementMatrixProvider),
        element_index: usize,
        layout: &ElementLayout,
    ) -> Result<DMatrix<f64>, PreconditionerError> {
        self.with_element_matrix(matrices, element_index, layout, |matrix| {
            schur_complement(
                element_index,
                matrix,
                layout.interface_slots(),
                layout.interior_slots(),
                self.singularity_tolerance,
            )
        })
    }

    /// Condense a single element, keeping the interior inverse and the extension operators.
    pub fn condense_element(
        &self,
        matrices: &(dyn Sync + ElementMatrixProvider),
        element_index: usize,
        layout: &ElementLayout,
    ) -> Result<LocalCondensation, PreconditionerError> {
        self.with_element_matrix(matrices, element_index, layout, |matrix| {
            condense(
                element_index,
                matrix,
                layout.interface_slots(),
                layout.interior_slots(),
                self.singularity_tolerance,
            )
        })
    }

    /// Condense all elements and assemble the reduced system over the coarse space.
    pub fn assemble(
        &self,
        space: &DuplicatedDofSpace,
        matrices: &(dyn Sync + ElementMatrixProvider),
    ) -> Result<ReducedSystem, PreconditionerError> {
        let blocks = space
            .elements()
            .par_iter()
            .enumerate()
            .map(|(element_index, layout)| self.element_schur_complement(matrices, element_index, layout))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Condensed {} elements onto {} interface DOFs", blocks.len(), space.num_coarse());
        Ok(self.assemble_from_blocks(space, &blocks))
    }

    /// Assemble the reduced system from precomputed element Schur complements.
    ///
    /// `blocks[i]` must be indexed by the interface slots of element `i`.
    pub fn assemble_from_blocks<B>(&self, space: &DuplicatedDofSpace, blocks: &[B]) -> ReducedSystem
    where
        B: Borrow<DMatrix<f64>>,
    {
        assert_eq!(blocks.len(), space.elements().len(), "Need one block per element.");
        let contributions: Vec<_> = space
            .elements()
            .iter()
            .zip(blocks)
            .map(|(layout, block)| ElementContribution {
                rows: layout.interface_coarse(),
                block: block.borrow(),
            })
            .collect();
        ReducedSystem::assemble(space.num_coarse(), self.storage, &contributions)
    }
}
