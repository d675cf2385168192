use fenris_bddc::factorization::{FactoredSystem, SparseFactorization};
use fenris_bddc::reduced::ReducedSystem;
use fenris_bddc::topology::{DofTable, ElementMatrixProvider};
use fenris_bddc::PreconditionerError;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use util::TriangleProblem;

mod cg;
mod class_cache;
mod condensation;
mod reduced;

/// Element matrices held in memory, in the slot order of the DOF numbering.
#[derive(Debug, Clone)]
pub struct ElementMatrices(pub Vec<DMatrix<f64>>);

impl ElementMatrixProvider for ElementMatrices {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let matrix = self
            .0
            .get(element_index)
            .ok_or_else(|| eyre::eyre!("no matrix for element {}", element_index))?;
        output.copy_from(matrix);
        Ok(())
    }
}

/// Returns an error for every element.
pub struct FailingProvider;

impl ElementMatrixProvider for FailingProvider {
    fn assemble_element_matrix_into(&self, element_index: usize, _output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        eyre::bail!("integration failed on element {}", element_index)
    }
}

pub fn dof_table(problem: &TriangleProblem) -> DofTable {
    DofTable::from_element_dofs(problem.num_dofs, &problem.element_dofs, problem.interface.clone())
}

pub fn element_matrices(problem: &TriangleProblem) -> ElementMatrices {
    ElementMatrices(problem.element_matrices.clone())
}

/// A "factorization" that solves with the identity matrix.
#[derive(Debug)]
pub struct IdentityFactorization;

#[derive(Debug)]
struct IdentitySolve(usize);

impl FactoredSystem for IdentitySolve {
    fn dim(&self) -> usize {
        self.0
    }

    fn solve_into(&self, rhs: DVectorView<f64>, mut out: DVectorViewMut<f64>) {
        out.copy_from(&rhs);
    }
}

impl SparseFactorization for IdentityFactorization {
    fn factor(&self, system: &ReducedSystem) -> Result<Box<dyn FactoredSystem>, PreconditionerError> {
        Ok(Box::new(IdentitySolve(system.nrows())))
    }
}

/// Dense matrix of the preconditioner, one column per unit vector.
pub fn preconditioner_matrix(apply: impl Fn(DVectorViewMut<f64>, DVectorView<f64>), n: usize) -> DMatrix<f64> {
    let mut result = DMatrix::zeros(n, n);
    let mut unit = DVector::zeros(n);
    for j in 0..n {
        unit[j] = 1.0;
        apply(result.column_mut(j), DVectorView::from(&unit));
        unit[j] = 0.0;
    }
    result
}
