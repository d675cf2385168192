//! The domain decomposition preconditioner.
//!
//! A [`DomainDecompositionPreconditioner`] starts out uninitialized. Every successful call to
//! [`update`](DomainDecompositionPreconditioner::update) replaces its state with a freshly
//! built operator, which is immutable until the next update and can be applied from several
//! threads at once. A failed update leaves the previous state untouched.
use crate::class_cache::ElementClassCache;
use crate::classify::{element_class, ElementClass};
use crate::condensation::LocalCondensation;
use crate::dof_space::DuplicatedDofSpace;
use crate::element_store::ElementMatrixStore;
use crate::error::PreconditionerError;
use crate::factorization::{
    BlockJacobiFactorization, DenseLuFactorization, SparseCholeskyFactorization, SparseFactorization,
};
use crate::interface::InterfaceSchurAssembler;
use crate::operator::LinearOperator;
use crate::options::{CoarseSolver, ElementReuse, MatrixStorage, PreconditionerKind, PreconditionerOptions};
use crate::reduced::ReducedSystem;
use crate::topology::{assemble_element_matrix, DofNumbering, ElementMatrixProvider, MeshTopology};
use log::{debug, info};
use nalgebra::{DMatrix, DVectorView, DVectorViewMut};
use rayon::prelude::*;
use std::error::Error;
use std::sync::Arc;

mod bddc;
mod wirebasket;

use bddc::BddcOperator;
use self_test::{assemble_dense_matrix, run_self_test};
use wirebasket::WirebasketOperator;

pub use self_test::SelfTestReport;

#[derive(Debug)]
enum BuiltOperator {
    Wirebasket(WirebasketOperator),
    Bddc(BddcOperator),
    ElementInverse(ElementMatrixStore),
}

#[derive(Debug)]
struct BuiltState {
    num_dofs: usize,
    operator: BuiltOperator,
    element_classes: Option<Vec<ElementClass>>,
    class_cache: Option<ElementClassCache>,
}

impl BuiltState {
    fn apply_add(&self, scale: f64, x: DVectorView<f64>, y: DVectorViewMut<f64>) {
        assert_eq!(x.len(), self.num_dofs, "Input vector must have one entry per DOF.");
        assert_eq!(y.len(), self.num_dofs, "Output vector must have one entry per DOF.");
        match &self.operator {
            BuiltOperator::Wirebasket(operator) => operator.apply_add(scale, x, y),
            BuiltOperator::Bddc(operator) => operator.apply_add(scale, x, y),
            BuiltOperator::ElementInverse(store) => store.apply_add(scale, x, y),
        }
    }
}

/// Condensations of all elements, together with the class information if classes were used.
struct CondensedElements {
    condensations: Vec<Arc<LocalCondensation>>,
    element_classes: Option<Vec<ElementClass>>,
    class_cache: Option<ElementClassCache>,
}

#[derive(Debug)]
pub struct DomainDecompositionPreconditioner {
    options: PreconditionerOptions,
    factorization: Option<Arc<dyn SparseFactorization>>,
    state: Option<BuiltState>,
}

impl Default for DomainDecompositionPreconditioner {
    fn default() -> Self {
        Self::new(PreconditionerOptions::default())
    }
}

impl DomainDecompositionPreconditioner {
    pub fn new(options: PreconditionerOptions) -> Self {
        Self {
            options,
            factorization: None,
            state: None,
        }
    }

    /// Use the given factorization for the reduced system instead of the one selected by
    /// [`PreconditionerOptions::coarse_solver`].
    pub fn with_factorization(options: PreconditionerOptions, factorization: Arc<dyn SparseFactorization>) -> Self {
        Self {
            options,
            factorization: Some(factorization),
            state: None,
        }
    }

    pub fn options(&self) -> &PreconditionerOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// The number of DOFs of the last successful update.
    pub fn num_dofs(&self) -> Option<usize> {
        self.state.as_ref().map(|state| state.num_dofs)
    }

    /// The reduced system of the last successful update.
    ///
    /// `None` if uninitialized or for [`PreconditionerKind::ElementInverse`].
    pub fn reduced_system(&self) -> Option<&ReducedSystem> {
        match &self.state.as_ref()?.operator {
            BuiltOperator::Wirebasket(operator) => Some(&operator.reduced),
            BuiltOperator::Bddc(operator) => Some(&operator.reduced),
            BuiltOperator::ElementInverse(_) => None,
        }
    }

    /// The duplicated DOF space of the last successful update.
    ///
    /// For the wirebasket preconditioner, this is just the coarse space.
    pub fn dof_space(&self) -> Option<&DuplicatedDofSpace> {
        match &self.state.as_ref()?.operator {
            BuiltOperator::Wirebasket(operator) => Some(&operator.space),
            BuiltOperator::Bddc(operator) => Some(&operator.space),
            BuiltOperator::ElementInverse(_) => None,
        }
    }

    /// The class of every element, if elements were grouped by class in the last update.
    pub fn element_classes(&self) -> Option<&[ElementClass]> {
        self.state.as_ref()?.element_classes.as_deref()
    }

    pub fn class_cache(&self) -> Option<&ElementClassCache> {
        self.state.as_ref()?.class_cache.as_ref()
    }

    /// Per-element condensations used by the BDDC operator.
    pub fn element_condensations(&self) -> Option<&[Arc<LocalCondensation>]> {
        match &self.state.as_ref()?.operator {
            BuiltOperator::Bddc(operator) => Some(operator.condensations()),
            _ => None,
        }
    }

    fn validate(&self, mesh: &dyn MeshTopology, dofs: &dyn DofNumbering) -> Result<(), PreconditionerError> {
        if mesh.num_elements() != dofs.num_elements() {
            return Err(PreconditionerError::IncompatibleOptions(format!(
                "Mesh has {} elements, but the DOF numbering has {}",
                mesh.num_elements(),
                dofs.num_elements()
            )));
        }
        let uses_coarse_solver = self.options.kind != PreconditionerKind::ElementInverse;
        if uses_coarse_solver
            && self.factorization.is_none()
            && self.options.coarse_solver == CoarseSolver::SparseCholesky
            && self.options.storage == MatrixStorage::General
        {
            return Err(PreconditionerError::IncompatibleOptions(
                "Sparse Cholesky factorization requires symmetric storage".to_string(),
            ));
        }
        Ok(())
    }

    fn coarse_factorization(&self, space: &DuplicatedDofSpace) -> Arc<dyn SparseFactorization> {
        if let Some(factorization) = &self.factorization {
            return Arc::clone(factorization);
        }
        let tolerance = self.options.singularity_tolerance;
        match &self.options.coarse_solver {
            CoarseSolver::SparseCholesky => Arc::new(SparseCholeskyFactorization),
            CoarseSolver::DenseLu => Arc::new(DenseLuFactorization::new(tolerance)),
            CoarseSolver::BlockJacobi { blocks } => {
                // Blocks are given in global DOFs, the factorization works on coarse indices
                let coarse_blocks = blocks
                    .iter()
                    .map(|block| {
                        block
                            .iter()
                            .filter_map(|&dof| {
                                if dof < space.num_dofs() {
                                    space.coarse_index(dof)
                                } else {
                                    None
                                }
                            })
                            .collect()
                    })
                    .collect();
                Arc::new(BlockJacobiFactorization::new(coarse_blocks).with_singularity_tolerance(tolerance))
            }
        }
    }

    fn condense_elements(
        &self,
        mesh: &dyn MeshTopology,
        space: &DuplicatedDofSpace,
        assembler: &InterfaceSchurAssembler,
        matrices: &(dyn Sync + ElementMatrixProvider),
    ) -> Result<CondensedElements, PreconditionerError> {
        let layouts = space.elements();
        match self.options.element_reuse {
            ElementReuse::None => {
                let condensations = layouts
                    .par_iter()
                    .enumerate()
                    .map(|(element_index, layout)| {
                        assembler
                            .condense_element(matrices, element_index, layout)
                            .map(Arc::new)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CondensedElements {
                    condensations,
                    element_classes: None,
                    class_cache: None,
                })
            }
            ElementReuse::ByVertexClass => {
                let classes = (0..mesh.num_elements())
                    .map(|element_index| {
                        let vertices = mesh.element_vertices(element_index);
                        element_class(vertices).ok_or(PreconditionerError::UnsupportedElement {
                            element_index,
                            vertex_count: vertices.len(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let slot_counts: Vec<_> = layouts.iter().map(|layout| layout.slot_counts()).collect();
                let cache = ElementClassCache::build_for_elements(&classes, &slot_counts, |element_index| {
                    assembler.condense_element(matrices, element_index, &layouts[element_index])
                })?;
                debug!(
                    "{} elements share {} cached condensations",
                    classes.len(),
                    cache.len()
                );
                let condensations = classes
                    .iter()
                    .map(|class| {
                        let condensation = cache
                            .get(class)
                            .expect("Internal error: Every class must have a cached condensation");
                        Arc::clone(condensation)
                    })
                    .collect();
                Ok(CondensedElements {
                    condensations,
                    element_classes: Some(classes),
                    class_cache: Some(cache),
                })
            }
        }
    }

    fn build(
        &self,
        mesh: &dyn MeshTopology,
        dofs: &dyn DofNumbering,
        matrices: &(dyn Sync + ElementMatrixProvider),
    ) -> Result<BuiltState, PreconditionerError> {
        let num_dofs = dofs.num_dofs();
        let assembler = InterfaceSchurAssembler::new(self.options.storage)
            .with_singularity_tolerance(self.options.singularity_tolerance);

        match self.options.kind {
            PreconditionerKind::Wirebasket => {
                let space = DuplicatedDofSpace::build(dofs, false);
                let (reduced, element_classes, class_cache) = match self.options.element_reuse {
                    ElementReuse::None => (assembler.assemble(&space, matrices)?, None, None),
                    ElementReuse::ByVertexClass => {
                        let condensed = self.condense_elements(mesh, &space, &assembler, matrices)?;
                        let blocks: Vec<_> = condensed.condensations.iter().map(|c| &c.schur).collect();
                        let reduced = assembler.assemble_from_blocks(&space, &blocks);
                        (reduced, condensed.element_classes, condensed.class_cache)
                    }
                };
                let factorization = self.coarse_factorization(&space);
                let operator = WirebasketOperator::build(space, reduced, factorization.as_ref())?;
                Ok(BuiltState {
                    num_dofs,
                    operator: BuiltOperator::Wirebasket(operator),
                    element_classes,
                    class_cache,
                })
            }
            PreconditionerKind::Bddc => {
                let space = DuplicatedDofSpace::build(dofs, true);
                let condensed = self.condense_elements(mesh, &space, &assembler, matrices)?;
                let blocks: Vec<_> = condensed.condensations.iter().map(|c| &c.schur).collect();
                let reduced = assembler.assemble_from_blocks(&space, &blocks);
                let factorization = self.coarse_factorization(&space);
                let operator = BddcOperator::build(space, reduced, condensed.condensations, factorization.as_ref())?;
                Ok(BuiltState {
                    num_dofs,
                    operator: BuiltOperator::Bddc(operator),
                    element_classes: condensed.element_classes,
                    class_cache: condensed.class_cache,
                })
            }
            PreconditionerKind::ElementInverse => {
                let mut store = ElementMatrixStore::new(num_dofs, dofs.num_elements());
                let mut element_matrix = DMatrix::zeros(0, 0);
                let mut element_dofs = Vec::new();
                for element_index in 0..dofs.num_elements() {
                    let dof_count = dofs.element_dof_count(element_index);
                    element_dofs.clear();
                    element_dofs.resize(dof_count, None);
                    dofs.populate_element_dofs(&mut element_dofs, element_index);
                    assemble_element_matrix(matrices, element_index, dof_count, &mut element_matrix)?;
                    store.set(element_index, &element_dofs, &element_matrix)?;
                }
                let inverse = store.inverse_by_element(self.options.singularity_tolerance)?;
                Ok(BuiltState {
                    num_dofs,
                    operator: BuiltOperator::ElementInverse(inverse),
                    element_classes: None,
                    class_cache: None,
                })
            }
        }
    }

    /// Rebuild the preconditioner for new element matrices.
    ///
    /// On error, the previously built preconditioner (if any) remains in place.
    pub fn update(
        &mut self,
        mesh: &dyn MeshTopology,
        dofs: &dyn DofNumbering,
        matrices: &(dyn Sync + ElementMatrixProvider),
    ) -> Result<(), PreconditionerError> {
        self.validate(mesh, dofs)?;
        let state = self.build(mesh, dofs, matrices)?;

        if self.options.self_test {
            if state.num_dofs <= self.options.self_test_max_dofs {
                let report = self.self_test_state(&state, dofs, matrices)?;
                info!("Preconditioner self-test: {:?}", report);
            } else {
                debug!(
                    "Skipping self-test: {} DOFs exceed the limit of {}",
                    state.num_dofs, self.options.self_test_max_dofs
                );
            }
        }

        match &state.operator {
            BuiltOperator::Wirebasket(operator) => info!(
                "Built wirebasket preconditioner: {} DOFs, {} interface DOFs, {} reduced non-zeros",
                state.num_dofs,
                operator.space.num_coarse(),
                operator.reduced.matrix().nnz()
            ),
            BuiltOperator::Bddc(operator) => info!(
                "Built BDDC preconditioner: {} DOFs, {} interface DOFs, {} duplicated DOFs, {} reduced non-zeros",
                state.num_dofs,
                operator.space.num_coarse(),
                operator.space.len(),
                operator.reduced.matrix().nnz()
            ),
            BuiltOperator::ElementInverse(store) => info!(
                "Built element-wise inverse preconditioner: {} DOFs, {} elements",
                state.num_dofs,
                store.num_elements()
            ),
        }
        if let Some(cache) = &state.class_cache {
            info!("Element class cache holds {} classes", cache.len());
        }

        self.state = Some(state);
        Ok(())
    }

    /// Compute $y \gets y + \alpha P x$.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` do not have one entry per DOF.
    pub fn apply_add<'a, 'b>(
        &self,
        scale: f64,
        x: impl Into<DVectorView<'a, f64>>,
        y: impl Into<DVectorViewMut<'b, f64>>,
    ) -> Result<(), PreconditionerError> {
        let state = self.state.as_ref().ok_or(PreconditionerError::NotInitialized)?;
        state.apply_add(scale, x.into(), y.into());
        Ok(())
    }

    /// Compute $y = P x$.
    pub fn apply<'a, 'b>(
        &self,
        y: impl Into<DVectorViewMut<'b, f64>>,
        x: impl Into<DVectorView<'a, f64>>,
    ) -> Result<(), PreconditionerError> {
        let state = self.state.as_ref().ok_or(PreconditionerError::NotInitialized)?;
        let mut y = y.into();
        y.fill(0.0);
        state.apply_add(1.0, x.into(), y);
        Ok(())
    }

    fn self_test_state(
        &self,
        state: &BuiltState,
        dofs: &dyn DofNumbering,
        matrices: &(dyn Sync + ElementMatrixProvider),
    ) -> Result<SelfTestReport, PreconditionerError> {
        if dofs.num_dofs() != state.num_dofs {
            return Err(PreconditionerError::IncompatibleOptions(format!(
                "DOF numbering has {} DOFs, but the preconditioner was built for {}",
                dofs.num_dofs(),
                state.num_dofs
            )));
        }
        let a = assemble_dense_matrix(dofs, matrices)?;
        let require_symmetry = self.options.storage == MatrixStorage::Symmetric;
        run_self_test(&a, |scale, x, y| state.apply_add(scale, x, y), require_symmetry)
    }

    /// Compare the preconditioner against the dense global matrix.
    ///
    /// Applies the preconditioner to every unit vector and computes the extreme eigenvalues of
    /// $P A$ through a Cholesky factorization of $A$. Only DOFs with a non-zero diagonal entry
    /// in $A$ take part. This is expensive and intended for small problems.
    pub fn self_test(
        &self,
        dofs: &dyn DofNumbering,
        matrices: &(dyn Sync + ElementMatrixProvider),
    ) -> Result<SelfTestReport, PreconditionerError> {
        let state = self.state.as_ref().ok_or(PreconditionerError::NotInitialized)?;
        let report = self.self_test_state(state, dofs, matrices)?;
        info!(
            "Self-test: eigenvalues of PA in [{:.4e}, {:.4e}], condition number {:.4e}, symmetry defect {:.2e}",
            report.lambda_min, report.lambda_max, report.condition_number, report.symmetry_defect
        );
        Ok(report)
    }
}

impl LinearOperator<f64> for DomainDecompositionPreconditioner {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        DomainDecompositionPreconditioner::apply(self, y, x)?;
        Ok(())
    }
}
