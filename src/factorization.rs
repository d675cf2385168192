//! Solvers for the reduced system.
//!
//! The preconditioner only needs to factor a [`ReducedSystem`] once per update and then solve
//! with the factorization repeatedly. Any backend can be plugged in through
//! [`SparseFactorization`].
use crate::condensation::{try_invert_dense, DEFAULT_SINGULARITY_TOLERANCE};
use crate::error::PreconditionerError;
use crate::options::MatrixStorage;
use crate::reduced::ReducedSystem;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::factorization::CscCholesky;
use std::fmt::Debug;

/// A factored system that can be solved repeatedly, possibly from several threads at once.
pub trait FactoredSystem: Debug + Send + Sync {
    fn dim(&self) -> usize;

    /// Solve $A x = b$ and store $x$ in `out`.
    fn solve_into(&self, rhs: DVectorView<f64>, out: DVectorViewMut<f64>);
}

pub trait SparseFactorization: Debug + Send + Sync {
    fn factor(&self, system: &ReducedSystem) -> Result<Box<dyn FactoredSystem>, PreconditionerError>;
}

/// Sparse Cholesky factorization of symmetric positive definite reduced systems.
#[derive(Debug, Copy, Clone, Default)]
pub struct SparseCholeskyFactorization;

#[derive(Debug)]
struct CholeskyFactor {
    cholesky: CscCholesky<f64>,
    dim: usize,
}

impl FactoredSystem for CholeskyFactor {
    fn dim(&self) -> usize {
        self.dim
    }

    fn solve_into(&self, rhs: DVectorView<f64>, mut out: DVectorViewMut<f64>) {
        let mut solution = DMatrix::from_iterator(self.dim, 1, rhs.iter().copied());
        self.cholesky.solve_mut(&mut solution);
        out.copy_from(&solution.column(0));
    }
}

impl SparseFactorization for SparseCholeskyFactorization {
    fn factor(&self, system: &ReducedSystem) -> Result<Box<dyn FactoredSystem>, PreconditionerError> {
        if system.storage() != MatrixStorage::Symmetric {
            return Err(PreconditionerError::IncompatibleOptions(
                "Sparse Cholesky factorization requires symmetric storage".to_string(),
            ));
        }
        let csc = system.to_full_csc();
        debug!("Factoring reduced system with {} rows and {} non-zeros", csc.nrows(), csc.nnz());
        let cholesky = CscCholesky::factor(&csc)
            .map_err(|err| PreconditionerError::SingularReducedSystem(format!("Cholesky factorization failed: {}", err)))?;
        Ok(Box::new(CholeskyFactor {
            cholesky,
            dim: system.nrows(),
        }))
    }
}

/// Dense LU factorization. Works for both storage layouts, but scales cubically with the
/// number of interface DOFs.
#[derive(Debug, Copy, Clone)]
pub struct DenseLuFactorization {
    singularity_tolerance: f64,
}

impl Default for DenseLuFactorization {
    fn default() -> Self {
        Self {
            singularity_tolerance: DEFAULT_SINGULARITY_TOLERANCE,
        }
    }
}

impl DenseLuFactorization {
    pub fn new(singularity_tolerance: f64) -> Self {
        Self { singularity_tolerance }
    }
}

#[derive(Debug)]
struct DenseInverse {
    inverse: DMatrix<f64>,
}

impl FactoredSystem for DenseInverse {
    fn dim(&self) -> usize {
        self.inverse.nrows()
    }

    fn solve_into(&self, rhs: DVectorView<f64>, mut out: DVectorViewMut<f64>) {
        out.gemv(1.0, &self.inverse, &rhs, 0.0);
    }
}

impl SparseFactorization for DenseLuFactorization {
    fn factor(&self, system: &ReducedSystem) -> Result<Box<dyn FactoredSystem>, PreconditionerError> {
        let inverse = try_invert_dense(system.to_dense(), self.singularity_tolerance).ok_or_else(|| {
            PreconditionerError::SingularReducedSystem("Dense LU factorization found a singular matrix".to_string())
        })?;
        Ok(Box::new(DenseInverse { inverse }))
    }
}

/// Additive block Jacobi approximation of the reduced system.
///
/// Blocks are given as lists of reduced (coarse) indices and may overlap. Rows not covered
/// by any block are treated as singleton blocks.
#[derive(Debug, Clone)]
pub struct BlockJacobiFactorization {
    blocks: Vec<Vec<usize>>,
    singularity_tolerance: f64,
}

impl BlockJacobiFactorization {
    pub fn new(blocks: Vec<Vec<usize>>) -> Self {
        Self {
            blocks,
            singularity_tolerance: DEFAULT_SINGULARITY_TOLERANCE,
        }
    }

    pub fn with_singularity_tolerance(self, singularity_tolerance: f64) -> Self {
        Self {
            singularity_tolerance,
            ..self
        }
    }

    pub fn blocks(&self) -> &[Vec<usize>] {
        &self.blocks
    }
}

#[derive(Debug)]
struct BlockInverses {
    dim: usize,
    blocks: Vec<(Vec<usize>, DMatrix<f64>)>,
}

impl FactoredSystem for BlockInverses {
    fn dim(&self) -> usize {
        self.dim
    }

    fn solve_into(&self, rhs: DVectorView<f64>, mut out: DVectorViewMut<f64>) {
        out.fill(0.0);
        let mut local_rhs = DVector::zeros(0);
        let mut local_out = DVector::zeros(0);
        for (indices, inverse) in &self.blocks {
            local_rhs.resize_vertically_mut(indices.len(), 0.0);
            local_out.resize_vertically_mut(indices.len(), 0.0);
            for (local, &i) in local_rhs.iter_mut().zip(indices) {
                *local = rhs[i];
            }
            local_out.gemv(1.0, inverse, &local_rhs, 0.0);
            for (&local, &i) in local_out.iter().zip(indices) {
                out[i] += local;
            }
        }
    }
}

impl SparseFactorization for BlockJacobiFactorization {
    fn factor(&self, system: &ReducedSystem) -> Result<Box<dyn FactoredSystem>, PreconditionerError> {
        let dim = system.nrows();
        let mut covered = vec![false; dim];
        let mut block_indices: Vec<Vec<usize>> = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let mut indices = block.clone();
            indices.sort_unstable();
            indices.dedup();
            if let Some(&out_of_bounds) = indices.iter().find(|&&i| i >= dim) {
                return Err(PreconditionerError::IncompatibleOptions(format!(
                    "Block Jacobi block contains index {} but the reduced system has only {} rows",
                    out_of_bounds, dim
                )));
            }
            if indices.is_empty() {
                continue;
            }
            for &i in &indices {
                covered[i] = true;
            }
            block_indices.push(indices);
        }
        let num_singletons = covered.iter().filter(|&&c| !c).count();
        block_indices.extend((0..dim).filter(|&i| !covered[i]).map(|i| vec![i]));
        debug!(
            "Block Jacobi with {} blocks ({} singletons)",
            block_indices.len(),
            num_singletons
        );

        let blocks = block_indices
            .into_iter()
            .map(|indices| {
                let dense = DMatrix::from_fn(indices.len(), indices.len(), |i, j| system.entry(indices[i], indices[j]));
                let inverse = try_invert_dense(dense, self.singularity_tolerance).ok_or_else(|| {
                    PreconditionerError::SingularReducedSystem(format!("Singular block Jacobi block {:?}", indices))
                })?;
                Ok((indices, inverse))
            })
            .collect::<Result<Vec<_>, PreconditionerError>>()?;

        Ok(Box::new(BlockInverses { dim, blocks }))
    }
}
