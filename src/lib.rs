//! Domain decomposition preconditioners for element-by-element finite element systems.
//!
//! The crate builds two-level preconditioners from per-element dense matrices and a global
//! DOF numbering. DOFs are split into a globally coupled *interface* (wirebasket) set and a
//! *local* (interior) set. Local DOFs are eliminated element by element through static
//! condensation, the resulting Schur complements are accumulated into a sparse reduced system
//! over the interface DOFs, and the reduced system is factored once per
//! [`update`](preconditioner::DomainDecompositionPreconditioner::update).
//!
//! Two variants are provided, selected through [`options::PreconditionerKind`]:
//!
//! - the *wirebasket* preconditioner, which applies the inverse of the assembled inexact
//!   Schur complement on the interface DOFs,
//! - the *BDDC* preconditioner, which duplicates local DOFs per element, can reuse the
//!   condensation of congruent elements through an [`class_cache::ElementClassCache`]
//!   and applies a restrict/solve/extend sequence with multiplicity weighting.
//!
//! A fallback mode inverting every element matrix independently is also available.

pub mod cg;
pub mod class_cache;
pub mod classify;
pub mod condensation;
pub mod dof_space;
pub mod element_store;
pub mod error;
pub mod factorization;
pub mod interface;
pub mod operator;
pub mod options;
pub mod preconditioner;
pub mod reduced;
pub mod topology;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use error::PreconditionerError;
pub use options::PreconditionerOptions;
pub use preconditioner::DomainDecompositionPreconditioner;
