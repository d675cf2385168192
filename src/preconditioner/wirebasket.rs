use crate::dof_space::DuplicatedDofSpace;
use crate::error::PreconditionerError;
use crate::factorization::{FactoredSystem, SparseFactorization};
use crate::reduced::ReducedSystem;
use nalgebra::{DVector, DVectorView, DVectorViewMut};

/// Inverse of the reduced system on the interface DOFs, zero on all other DOFs.
#[derive(Debug)]
pub(crate) struct WirebasketOperator {
    pub space: DuplicatedDofSpace,
    pub reduced: ReducedSystem,
    factor: Box<dyn FactoredSystem>,
}

impl WirebasketOperator {
    pub fn build(
        space: DuplicatedDofSpace,
        reduced: ReducedSystem,
        factorization: &dyn SparseFactorization,
    ) -> Result<Self, PreconditionerError> {
        let factor = factorization.factor(&reduced)?;
        assert_eq!(factor.dim(), space.num_coarse(), "Factorization must match the coarse space.");
        Ok(Self { space, reduced, factor })
    }

    pub fn apply_add(&self, scale: f64, x: DVectorView<f64>, y: DVectorViewMut<f64>) {
        let num_coarse = self.space.num_coarse();
        let mut lx = DVector::zeros(num_coarse);
        let mut ly = DVector::zeros(num_coarse);
        self.space.restrict_into(x, DVectorViewMut::from(&mut lx));
        self.factor
            .solve_into(DVectorView::from(&lx), DVectorViewMut::from(&mut ly));
        self.space.extend_add(scale, DVectorView::from(&ly), y);
    }
}
