//! Configuration of the domain decomposition preconditioner.
use crate::condensation::DEFAULT_SINGULARITY_TOLERANCE;
use serde::{Deserialize, Serialize};

/// Which preconditioner to build.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionerKind {
    /// Solve on the interface DOFs only, with the element interiors condensed out.
    Wirebasket,
    /// Balancing domain decomposition by constraints: the wirebasket solve combined with
    /// local interior solves on a duplicated DOF space.
    Bddc,
    /// Apply the dense inverse of every element matrix independently.
    ElementInverse,
}

/// Solver used for the reduced system on the interface DOFs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoarseSolver {
    /// Sparse Cholesky factorization. Requires symmetric storage.
    SparseCholesky,
    /// Dense LU factorization. Only suitable for small interface spaces.
    DenseLu,
    /// Dense inverse of each given block of global DOFs, applied additively.
    ///
    /// Interface DOFs not covered by any block are treated as singleton blocks.
    BlockJacobi { blocks: Vec<Vec<usize>> },
}

/// Storage layout of the reduced system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixStorage {
    /// Only the lower triangle (row >= column) is stored.
    Symmetric,
    General,
}

/// Whether element condensations are shared between congruent elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementReuse {
    /// Condense one representative per [element class](crate::classify::ElementClass) and
    /// reuse the result for every element in the same class.
    ByVertexClass,
    /// Condense every element individually.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreconditionerOptions {
    pub kind: PreconditionerKind,
    pub coarse_solver: CoarseSolver,
    pub storage: MatrixStorage,
    pub element_reuse: ElementReuse,
    /// Relative pivot tolerance for dense local inverses.
    pub singularity_tolerance: f64,
    /// Run [`self_test`](crate::preconditioner::DomainDecompositionPreconditioner::self_test)
    /// after every successful update.
    pub self_test: bool,
    /// The self test is skipped for problems with more DOFs than this.
    pub self_test_max_dofs: usize,
}

impl Default for PreconditionerOptions {
    fn default() -> Self {
        Self {
            kind: PreconditionerKind::Bddc,
            coarse_solver: CoarseSolver::SparseCholesky,
            storage: MatrixStorage::Symmetric,
            element_reuse: ElementReuse::None,
            singularity_tolerance: DEFAULT_SINGULARITY_TOLERANCE,
            self_test: false,
            self_test_max_dofs: 2000,
        }
    }
}

impl PreconditionerOptions {
    pub fn with_kind(self, kind: PreconditionerKind) -> Self {
        Self { kind, ..self }
    }

    pub fn with_coarse_solver(self, coarse_solver: CoarseSolver) -> Self {
        Self { coarse_solver, ..self }
    }

    pub fn with_storage(self, storage: MatrixStorage) -> Self {
        Self { storage, ..self }
    }

    pub fn with_element_reuse(self, element_reuse: ElementReuse) -> Self {
        Self { element_reuse, ..self }
    }

    pub fn with_singularity_tolerance(self, singularity_tolerance: f64) -> Self {
        Self {
            singularity_tolerance,
            ..self
        }
    }

    pub fn with_self_test(self, self_test: bool) -> Self {
        Self { self_test, ..self }
    }

    pub fn with_self_test_max_dofs(self, self_test_max_dofs: usize) -> Self {
        Self {
            self_test_max_dofs,
            ..self
        }
    }
}
