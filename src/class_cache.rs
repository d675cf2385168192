//! Reuse of static condensation results across congruent elements.
//!
//! Elements in the same [`ElementClass`] are assumed to have numerically identical element
//! matrices in their local slot ordering. This holds for congruent elements whose local DOF
//! ordering follows the relative order of their vertex numbers, e.g. translated copies on a
//! structured mesh, but not for general unstructured geometry. Callers that cannot guarantee
//! it should use
//! [`ElementReuse::None`](crate::options::ElementReuse::None).
use crate::classify::ElementClass;
use crate::condensation::LocalCondensation;
use crate::error::PreconditionerError;
use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CacheEntry {
    representative: usize,
    condensation: Arc<LocalCondensation>,
}

/// Cached local condensations, one per element class.
#[derive(Debug, Clone, Default)]
pub struct ElementClassCache {
    entries: FxHashMap<ElementClass, CacheEntry>,
}

impl ElementClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, class: &ElementClass) -> Option<&Arc<LocalCondensation>> {
        self.entries.get(class).map(|entry| &entry.condensation)
    }

    /// The element whose matrix was condensed for the given class.
    pub fn representative(&self, class: &ElementClass) -> Option<usize> {
        self.entries.get(class).map(|entry| entry.representative)
    }

    pub fn classes(&self) -> impl '_ + Iterator<Item = ElementClass> {
        self.entries.keys().copied()
    }

    /// Return the cached condensation of `class`, or build it from `element_index`.
    ///
    /// If the class has not been seen before, `element_index` becomes its representative and
    /// `build` is invoked with it. Otherwise the cached result is returned unchanged and
    /// `build` is not called.
    pub fn get_or_build<F>(
        &mut self,
        class: ElementClass,
        element_index: usize,
        build: F,
    ) -> Result<Arc<LocalCondensation>, PreconditionerError>
    where
        F: FnOnce(usize) -> Result<LocalCondensation, PreconditionerError>,
    {
        if let Some(entry) = self.entries.get(&class) {
            return Ok(Arc::clone(&entry.condensation));
        }

        debug!("Building condensation for class {:?} from element {}", class, element_index);
        let condensation = Arc::new(build(element_index)?);
        self.entries.insert(
            class,
            CacheEntry {
                representative: element_index,
                condensation: Arc::clone(&condensation),
            },
        );
        Ok(condensation)
    }

    /// Build the cache for a whole mesh.
    ///
    /// `classes[i]` is the class of element `i` and `slot_counts[i]` its
    /// (interface, interior) slot counts. The first element of each class is its representative.
    /// Representatives are condensed in parallel. Every element must have the same slot counts
    /// as the representative of its class.
    pub fn build_for_elements<F>(
        classes: &[ElementClass],
        slot_counts: &[(usize, usize)],
        build: F,
    ) -> Result<Self, PreconditionerError>
    where
        F: Sync + Fn(usize) -> Result<LocalCondensation, PreconditionerError>,
    {
        assert_eq!(classes.len(), slot_counts.len(), "Need slot counts for every element.");

        let mut representatives = FxHashMap::default();
        for (element_index, (class, counts)) in classes.iter().zip(slot_counts).enumerate() {
            let &mut representative = representatives.entry(*class).or_insert(element_index);
            let expected = slot_counts[representative];
            if *counts != expected {
                return Err(PreconditionerError::ElementClassMismatch {
                    element_index,
                    class: *class,
                    expected,
                    actual: *counts,
                });
            }
        }

        let mut representatives: Vec<(ElementClass, usize)> = representatives.into_iter().collect();
        representatives.sort_unstable_by_key(|&(_, element_index)| element_index);

        let built = representatives
            .par_iter()
            .map(|&(class, element_index)| {
                debug!("Building condensation for class {:?} from element {}", class, element_index);
                let condensation = build(element_index)?;
                Ok((
                    class,
                    CacheEntry {
                        representative: element_index,
                        condensation: Arc::new(condensation),
                    },
                ))
            })
            .collect::<Result<Vec<_>, PreconditionerError>>()?;

        Ok(Self {
            entries: built.into_iter().collect(),
        })
    }
}
