use fenris_bddc::options::MatrixStorage;
use fenris_bddc::reduced::{ElementContribution, ReducedSystem};
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use proptest::prelude::*;
use util::spd_matrix;

#[test]
fn shared_dof_accumulates_contributions_of_both_elements() {
    // Two elements share coarse index 1
    let block_a = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 3.0]);
    let block_b = DMatrix::from_row_slice(2, 2, &[5.0, 0.5, 0.5, 7.0]);
    let contributions = [
        ElementContribution {
            rows: &[0, 1],
            block: &block_a,
        },
        ElementContribution {
            rows: &[1, 2],
            block: &block_b,
        },
    ];

    for storage in [MatrixStorage::Symmetric, MatrixStorage::General] {
        let reduced = ReducedSystem::assemble(3, storage, &contributions);
        assert_eq!(reduced.entry(1, 1), 3.0 + 5.0);
        assert_eq!(reduced.entry(0, 1), -1.0);
        assert_eq!(reduced.entry(1, 0), -1.0);
        assert_eq!(reduced.entry(2, 1), 0.5);
        assert_eq!(reduced.entry(0, 2), 0.0);
        assert!(reduced.pinned_rows().is_empty());

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(3, 3, &[
            2.0, -1.0, 0.0,
            -1.0, 8.0, 0.5,
            0.0, 0.5, 7.0,
        ]);
        assert_eq!(reduced.to_dense(), expected);
        assert_eq!(DMatrix::from(&reduced.to_full_csc()), expected);
    }
}

#[test]
fn symmetric_storage_keeps_lower_triangle() {
    let block = spd_matrix(4, &[1.0, 2.0, -0.5, 0.25, 3.0]);
    let contributions = [ElementContribution {
        rows: &[3, 0, 2, 1],
        block: &block,
    }];
    let symmetric = ReducedSystem::assemble(4, MatrixStorage::Symmetric, &contributions);
    let general = ReducedSystem::assemble(4, MatrixStorage::General, &contributions);

    assert!(symmetric.matrix().triplet_iter().all(|(i, j, _)| i >= j));
    assert_eq!(symmetric.matrix().nnz(), 10);
    assert_eq!(general.matrix().nnz(), 16);
    assert_eq!(symmetric.to_dense(), general.to_dense());
}

#[test]
fn rows_without_contributions_are_pinned_to_identity() {
    let block = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
    let contributions = [ElementContribution {
        rows: &[0, 2],
        block: &block,
    }];
    let reduced = ReducedSystem::assemble(4, MatrixStorage::Symmetric, &contributions);

    // Row 1 and 3 receive nothing. Row 2 is referenced, so its zeros are kept as they are
    assert_eq!(reduced.pinned_rows(), &[1, 3]);
    assert_eq!(
        reduced.to_dense(),
        DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 1.0, 0.0, 1.0]))
    );
    // The diagonal is always part of the pattern
    for i in 0..4 {
        assert!(reduced.matrix().get_entry(i, i).is_some());
    }
}

#[test]
fn zero_diagonal_with_coupling_is_kept() {
    let block = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
    let contributions = [ElementContribution {
        rows: &[0, 1],
        block: &block,
    }];

    for storage in [MatrixStorage::Symmetric, MatrixStorage::General] {
        let reduced = ReducedSystem::assemble(2, storage, &contributions);
        assert!(reduced.pinned_rows().is_empty());
        assert_eq!(reduced.to_dense(), block);
    }
}

#[test]
fn empty_system() {
    let reduced = ReducedSystem::assemble(0, MatrixStorage::General, &[]);
    assert_eq!(reduced.nrows(), 0);
    assert_eq!(reduced.matrix().nnz(), 0);
}

fn shuffled_contributions() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<f64>, Vec<usize>)> {
    let num_rows: usize = 8;
    let rows = prop::collection::btree_set(0..num_rows, 1..=4).prop_map(|rows| rows.into_iter().collect::<Vec<_>>());
    (
        prop::collection::vec(rows, 1..8),
        prop::collection::vec(-1.0..1.0, 16),
    )
        .prop_flat_map(|(rows, values)| {
            let n = rows.len();
            (Just(rows), Just(values), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        })
}

proptest! {
    #[test]
    fn accumulation_does_not_depend_on_element_order((rows, values, permutation) in shuffled_contributions()) {
        let blocks: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, rows)| spd_matrix(rows.len(), &values[i..]))
            .collect();
        let contributions: Vec<_> = rows
            .iter()
            .zip(&blocks)
            .map(|(rows, block)| ElementContribution {
                rows: rows.as_slice(),
                block,
            })
            .collect();
        let permuted: Vec<_> = permutation.iter().map(|&i| contributions[i]).collect();

        let reference = ReducedSystem::assemble(8, MatrixStorage::Symmetric, &contributions);
        let shuffled = ReducedSystem::assemble(8, MatrixStorage::Symmetric, &permuted);
        prop_assert_eq!(reference.matrix().pattern(), shuffled.matrix().pattern());
        prop_assert_eq!(reference.pinned_rows(), shuffled.pinned_rows());
        assert_matrix_eq!(reference.to_dense(), shuffled.to_dense(), comp = abs, tol = 1e-12);

        // Assembly is deterministic
        let again = ReducedSystem::assemble(8, MatrixStorage::Symmetric, &contributions);
        prop_assert_eq!(reference, again);
    }
}
