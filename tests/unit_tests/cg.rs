use fenris_bddc::cg::{ConjugateGradient, RelativeResidualCriterion, SolveErrorKind};
use fenris_bddc::operator::LinearOperator;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use util::spd_matrix;

/// Diagonal scaling with the inverse diagonal of a matrix.
struct Jacobi(DVector<f64>);

impl LinearOperator<f64> for Jacobi {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x.component_div(&self.0));
        Ok(())
    }
}

/// Symmetric tridiagonal matrix with a strongly varying diagonal.
fn badly_scaled_matrix(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            2.0 * 10f64.powi((i % 4) as i32)
        } else if i.abs_diff(j) == 1 {
            -0.5
        } else {
            0.0
        }
    })
}

#[test]
fn cg_converges_on_spd_system() {
    let a = spd_matrix(12, &[0.5, -0.2, 0.1, 0.8, -0.9]);
    let b = DVector::from_fn(12, |i, _| 1.0 + i as f64);
    let mut x = DVector::<f64>::zeros(12);

    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-12))
        .solve_with_guess(&b, &mut x)
        .unwrap();
    assert!(output.num_iterations <= 12);
    let expected = a.clone().cholesky().unwrap().solve(&b);
    assert_matrix_eq!(x, expected, comp = abs, tol = 1e-8);
}

#[test]
fn cg_with_sparse_operator_and_preconditioner() {
    let a = badly_scaled_matrix(40);
    let csr = CsrMatrix::from(&a);
    let b = DVector::from_element(40, 1.0);

    let mut x_plain = DVector::<f64>::zeros(40);
    let plain = ConjugateGradient::new()
        .with_operator(&csr)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-10))
        .solve_with_guess(&b, &mut x_plain)
        .unwrap();

    let mut x_jacobi = DVector::<f64>::zeros(40);
    let jacobi = ConjugateGradient::new()
        .with_operator(&csr)
        .with_preconditioner(Jacobi(a.diagonal()))
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-10))
        .solve_with_guess(&b, &mut x_jacobi)
        .unwrap();

    assert!(jacobi.num_iterations < plain.num_iterations);
    assert_matrix_eq!(&a * &x_jacobi, b, comp = abs, tol = 1e-6);
    assert_matrix_eq!(x_plain, x_jacobi, comp = abs, tol = 1e-6);
}

#[test]
fn cg_zero_rhs_gives_zero_solution() {
    let a = spd_matrix(3, &[1.0]);
    let b = DVector::<f64>::zeros(3);
    let mut x = DVector::from_element(3, 5.0);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .solve_with_guess(&b, &mut x)
        .unwrap();
    assert_eq!(output.num_iterations, 0);
    assert_eq!(x, DVector::zeros(3));
}

#[test]
fn cg_reports_max_iterations() {
    let a = badly_scaled_matrix(30);
    let b = DVector::from_element(30, 1.0);
    let mut x = DVector::<f64>::zeros(30);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .with_max_iter(2)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-14))
        .solve_with_guess(&b, &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::MaxIterationsReached { max_iter: 2 }));
    assert_eq!(err.output.num_iterations, 2);
}

#[test]
fn cg_detects_indefinite_operator() {
    let a = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -1.0]));
    let b = DVector::from_vec(vec![1.0, 1.0]);
    let mut x = DVector::<f64>::zeros(2);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .solve_with_guess(&b, &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::IndefiniteOperator));
}
