//! Errors reported while building or applying a preconditioner.
use crate::classify::ElementClass;
use std::error::Error;
use std::fmt;

/// Errors that can occur when building a domain decomposition preconditioner.
///
/// The variants fall into four groups:
///
/// - *configuration* errors (unsupported elements, inconsistent element classes, failed element
///   matrix assembly, incompatible options),
/// - *numeric* errors (singular local blocks, singular reduced systems, failed self-tests),
/// - *capacity* errors (writes to elements outside of a preallocated store),
/// - *state* errors (applying a preconditioner that has never been built).
///
/// None of them are retried internally. A failed
/// [`update`](crate::preconditioner::DomainDecompositionPreconditioner::update) leaves the
/// previously built state in place.
#[derive(Debug)]
#[non_exhaustive]
pub enum PreconditionerError {
    UnsupportedElement {
        element_index: usize,
        vertex_count: usize,
    },
    ElementClassMismatch {
        element_index: usize,
        class: ElementClass,
        /// (interface, interior) slot counts of the representative element.
        expected: (usize, usize),
        /// (interface, interior) slot counts of the offending element.
        actual: (usize, usize),
    },
    ElementMatrixAssembly {
        element_index: usize,
        source: eyre::Report,
    },
    IncompatibleOptions(String),
    SingularLocalBlock {
        element_index: usize,
    },
    SingularReducedSystem(String),
    SelfTestFailed(String),
    ElementIndexOutOfBounds {
        element_index: usize,
        num_elements: usize,
    },
    NotInitialized,
}

impl PreconditionerError {
    /// Whether the error is caused by the numerical values rather than by the problem setup.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::SingularLocalBlock { .. } | Self::SingularReducedSystem(_) | Self::SelfTestFailed(_)
        )
    }
}

impl fmt::Display for PreconditionerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedElement {
                element_index,
                vertex_count,
            } => write!(
                f,
                "Element {element_index} has {vertex_count} vertices. \
                 Only triangles (3) and tetrahedra (4) can be classified."
            ),
            Self::ElementClassMismatch {
                element_index,
                class,
                expected,
                actual,
            } => write!(
                f,
                "Element {element_index} belongs to class {class:?} with (interface, interior) \
                 slot counts {expected:?}, but has {actual:?}"
            ),
            Self::ElementMatrixAssembly { element_index, source } => {
                write!(f, "Failed to assemble matrix of element {element_index}: {source}")
            }
            Self::IncompatibleOptions(msg) => write!(f, "Incompatible preconditioner options: {msg}"),
            Self::SingularLocalBlock { element_index } => {
                write!(f, "Interior block of element {element_index} is singular")
            }
            Self::SingularReducedSystem(msg) => write!(f, "Reduced interface system is singular: {msg}"),
            Self::SelfTestFailed(msg) => write!(f, "Preconditioner self-test failed: {msg}"),
            Self::ElementIndexOutOfBounds {
                element_index,
                num_elements,
            } => write!(
                f,
                "Element index {element_index} out of bounds for store with {num_elements} elements"
            ),
            Self::NotInitialized => write!(f, "Preconditioner has not been built. Call update() first."),
        }
    }
}

impl Error for PreconditionerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ElementMatrixAssembly { source, .. } => {
                let source: &(dyn Error + 'static) = source.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}
