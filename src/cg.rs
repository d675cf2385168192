//! Preconditioned conjugate gradient for symmetric positive definite operators.
//!
//! Mostly useful to drive the preconditioners of this crate through a Krylov solver, and
//! to measure their effect on iteration counts.
use crate::operator::{IdentityOperator, LinearOperator};
use nalgebra::{DVector, DVectorView, DVectorViewMut, RealField};
use std::error::Error;
use std::fmt;

/// Relative residual tolerance $\|r\| \leq \text{tol} \|b\|$, evaluated on the residual
/// that CG updates recursively.
#[derive(Debug, Copy, Clone)]
pub struct RelativeResidualCriterion<T> {
    tol: T,
}

impl<T> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }
}

impl Default for RelativeResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "Error applying operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "Error applying preconditioner: {}", err),
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => write!(f, "Max iterations ({}) reached.", max_iter),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CgOutput {
    /// Number of updates made to the solution vector.
    pub num_iterations: usize,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct SolveError {
    pub output: CgOutput,
    pub kind: SolveErrorKind,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CG solve failed after {} iterations. Error: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl Error for SolveError {}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
struct CgWorkspace<T: RealField> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

impl<T: RealField> CgWorkspace<T> {
    fn resize(&mut self, dim: usize) {
        for buffer in [&mut self.r, &mut self.z, &mut self.p, &mut self.Ap] {
            buffer.resize_vertically_mut(dim, T::zero());
        }
    }
}

/// Builder-style preconditioned conjugate gradient solver.
///
/// ```ignore
/// let output = ConjugateGradient::new()
///     .with_operator(&matrix)
///     .with_preconditioner(&preconditioner)
///     .with_stopping_criterion(RelativeResidualCriterion::new(1e-10))
///     .with_max_iter(500)
///     .solve_with_guess(&b, &mut x)?;
/// ```
#[derive(Debug)]
pub struct ConjugateGradient<T: RealField, A, P> {
    workspace: CgWorkspace<T>,
    operator: A,
    preconditioner: P,
    stopping_criterion: RelativeResidualCriterion<T>,
    max_iter: Option<usize>,
}

impl ConjugateGradient<f64, (), IdentityOperator> {
    pub fn new() -> Self {
        Self {
            workspace: CgWorkspace {
                r: DVector::zeros(0),
                z: DVector::zeros(0),
                p: DVector::zeros(0),
                Ap: DVector::zeros(0),
            },
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: RelativeResidualCriterion::default(),
            max_iter: None,
        }
    }
}

impl<T: RealField, P> ConjugateGradient<T, (), P> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<T, A, P> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<T: RealField, A, P> ConjugateGradient<T, A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<T, A, P2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion(self, stopping_criterion: RelativeResidualCriterion<T>) -> Self {
        Self {
            stopping_criterion,
            ..self
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<T, A, P> ConjugateGradient<T, A, P>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
{
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput, SolveError> {
        self.solve_with_guess_(b.into(), x.into())
    }

    #[allow(non_snake_case)]
    fn solve_with_guess_(&mut self, b: DVectorView<T>, mut x: DVectorViewMut<T>) -> Result<CgOutput, SolveError> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());

        let mut output = CgOutput { num_iterations: 0 };
        let fail = |output: &CgOutput, kind| SolveError {
            output: output.clone(),
            kind,
        };

        self.workspace.resize(x.len());
        let CgWorkspace { r, z, p, Ap } = &mut self.workspace;

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        // r = b - Ax
        self.operator
            .apply(DVectorViewMut::from(&mut *r), (&x).into())
            .map_err(|err| fail(&output, OperatorError(err)))?;
        r.axpy(T::one(), &b, -T::one());

        // z = Pr
        self.preconditioner
            .apply(DVectorViewMut::from(&mut *z), (&*r).into())
            .map_err(|err| fail(&output, PreconditionerError(err)))?;
        p.copy_from(z);
        let mut zTr = z.dot(r);

        loop {
            if r.norm() <= self.stopping_criterion.tol * b_norm {
                break;
            }
            if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(fail(&output, MaxIterationsReached { max_iter }));
                }
            }

            // Ap = A * p
            self.operator
                .apply(DVectorViewMut::from(&mut *Ap), (&*p).into())
                .map_err(|err| fail(&output, OperatorError(err)))?;
            let pAp = p.dot(Ap);
            if pAp <= T::zero() {
                return Err(fail(&output, IndefiniteOperator));
            }
            if zTr <= T::zero() {
                return Err(fail(&output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            x.axpy(alpha, &*p, T::one());
            r.axpy(-alpha, &*Ap, T::one());
            output.num_iterations += 1;

            // z = P r
            self.preconditioner
                .apply(DVectorViewMut::from(&mut *z), (&*r).into())
                .map_err(|err| fail(&output, PreconditionerError(err)))?;
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;

            // p = z + beta * p
            p.axpy(T::one(), z, beta);
            zTr = zTr_next;
        }

        Ok(output)
    }
}
