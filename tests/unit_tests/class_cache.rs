use fenris_bddc::class_cache::ElementClassCache;
use fenris_bddc::classify::{element_class, sorted_local_vertices, ElementClass};
use fenris_bddc::condensation::condense;
use fenris_bddc::PreconditionerError;
use itertools::Itertools;
use nalgebra::DMatrix;
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use util::spd_matrix;

#[test]
fn all_tetrahedron_permutations_have_distinct_classes() {
    let reference = [11, 42, 57, 90];
    let permutations: Vec<Vec<usize>> = reference.into_iter().permutations(4).collect();
    assert_eq!(permutations.len(), 24);

    let classes: Vec<ElementClass> = permutations
        .iter()
        .map(|vertices| element_class(vertices).unwrap())
        .collect();
    let distinct: BTreeSet<_> = classes.iter().map(|class| class.id()).collect();
    assert_eq!(distinct.len(), 24);
    assert!(distinct.iter().all(|&id| id < ElementClass::num_classes(4).unwrap()));
    assert!(classes.iter().all(|class| class.vertex_count() == 4));

    // Identical permutations map to identical classes
    for (vertices, class) in permutations.iter().zip(&classes) {
        assert_eq!(element_class(vertices).unwrap(), *class);
    }
}

#[test]
fn class_ids_follow_the_sorting_network() {
    // (0, 1) swaps, nothing else does
    assert_eq!(element_class(&[2, 1, 3, 4]).unwrap().id(), 0b00001);
    // (2, 3) swaps, nothing else does
    assert_eq!(element_class(&[1, 2, 4, 3]).unwrap().id(), 0b00010);
    // Reversed order: (0, 1), (2, 3), (0, 2), (1, 3) swap, (1, 2) does not
    assert_eq!(element_class(&[4, 3, 2, 1]).unwrap().id(), 0b01111);
    // Triangles: reversed order swaps in all three comparisons
    assert_eq!(element_class(&[3, 2, 1]).unwrap().id(), 0b111);
    assert_eq!(element_class(&[1, 3, 2]).unwrap().id(), 0b010);
    assert_eq!(sorted_local_vertices(&[30, 10, 20]).unwrap(), vec![1, 2, 0]);
}

#[test]
fn element_classes_with_unsupported_vertex_counts() {
    assert_eq!(element_class(&[0, 1]), None);
    assert_eq!(element_class(&[0, 1, 2, 3, 4, 5, 6, 7]), None);
    assert_eq!(sorted_local_vertices(&[0, 1, 2, 3, 4]), None);
}

fn distinct_vertices() -> impl Strategy<Value = Vec<usize>> {
    prop_oneof![Just(3usize), Just(4usize)].prop_flat_map(|n| {
        prop::collection::btree_set(0usize..1000, n)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    })
}

proptest! {
    #[test]
    fn class_is_invariant_under_monotone_relabeling(
        vertices in distinct_vertices(),
        scale in 1usize..50,
        offset in 0usize..10_000,
    ) {
        let relabeled: Vec<_> = vertices.iter().map(|&v| scale * v * v + offset).collect();
        prop_assert_eq!(element_class(&vertices), element_class(&relabeled));
    }

    #[test]
    fn sorted_local_vertices_sorts(vertices in distinct_vertices()) {
        let order = sorted_local_vertices(&vertices).unwrap();
        let sorted: Vec<_> = order.iter().map(|&i| vertices[i]).collect();
        let mut expected = vertices.clone();
        expected.sort_unstable();
        prop_assert_eq!(sorted, expected);
    }
}

#[test]
fn get_or_build_builds_once_per_class() {
    let k = spd_matrix(3, &[1.0, -0.5, 0.25]);
    let builds = Cell::new(0);
    let build = |element_index| {
        builds.set(builds.get() + 1);
        condense(element_index, &k, &[0, 1], &[2], 1e-12)
    };

    let mut cache = ElementClassCache::new();
    let class_a = element_class(&[0, 1, 2]).unwrap();
    let class_b = element_class(&[2, 1, 0]).unwrap();

    let first = cache.get_or_build(class_a, 3, build).unwrap();
    let second = cache.get_or_build(class_a, 5, build).unwrap();
    assert_eq!(builds.get(), 1);
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(cache.representative(&class_a), Some(3));

    cache.get_or_build(class_b, 4, build).unwrap();
    assert_eq!(builds.get(), 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.representative(&class_b), Some(4));
    assert_eq!(cache.classes().collect::<BTreeSet<_>>(), BTreeSet::from([class_a, class_b]));

    // A failing build leaves no entry behind
    let class_c = element_class(&[1, 0, 2]).unwrap();
    let singular = DMatrix::<f64>::zeros(3, 3);
    let result = cache.get_or_build(class_c, 9, |element_index| {
        condense(element_index, &singular, &[0, 1], &[2], 1e-12)
    });
    assert!(matches!(result, Err(PreconditionerError::SingularLocalBlock { element_index: 9 })));
    assert!(cache.get(&class_c).is_none());
}

#[test]
fn build_for_elements_uses_first_element_as_representative() {
    let classes: Vec<_> = [[0, 1, 2], [5, 4, 3], [3, 4, 5], [9, 7, 8], [10, 20, 30]]
        .iter()
        .map(|vertices| element_class(vertices).unwrap())
        .collect();
    let slot_counts = vec![(2, 1); classes.len()];
    let k = spd_matrix(3, &[0.5, 1.5, -1.0, 2.0]);

    let builds = AtomicUsize::new(0);
    let cache = ElementClassCache::build_for_elements(&classes, &slot_counts, |element_index| {
        builds.fetch_add(1, Ordering::SeqCst);
        condense(element_index, &k, &[0, 1], &[2], 1e-12)
    })
    .unwrap();

    let distinct: BTreeSet<_> = classes.iter().copied().collect();
    assert_eq!(cache.len(), distinct.len());
    assert_eq!(builds.load(Ordering::SeqCst), distinct.len());
    assert_eq!(cache.representative(&classes[0]), Some(0));
    assert_eq!(cache.representative(&classes[1]), Some(1));
    assert_eq!(cache.representative(&classes[3]), Some(3));
    // Element 2 and 4 are sorted like element 0
    assert_eq!(classes[2], classes[0]);
    assert_eq!(classes[4], classes[0]);
    assert_eq!(cache.get(&classes[0]).unwrap().num_interior(), 1);
}

#[test]
fn build_for_elements_rejects_inconsistent_classes() {
    let classes: Vec<_> = [[0, 1, 2], [3, 4, 5]]
        .iter()
        .map(|vertices| element_class(vertices).unwrap())
        .collect();
    let slot_counts = vec![(3, 0), (2, 1)];
    let k = spd_matrix(3, &[0.5, 1.5, -1.0, 2.0]);

    let result = ElementClassCache::build_for_elements(&classes, &slot_counts, |element_index| {
        condense(element_index, &k, &[0, 1, 2], &[], 1e-12)
    });
    match result {
        Err(PreconditionerError::ElementClassMismatch {
            element_index,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(element_index, 1);
            assert_eq!(expected, (3, 0));
            assert_eq!(actual, (2, 1));
        }
        other => panic!("Unexpected result: {:?}", other),
    }
}
