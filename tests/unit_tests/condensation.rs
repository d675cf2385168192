use fenris_bddc::condensation::{condense, schur_complement, try_invert_dense};
use fenris_bddc::PreconditionerError;
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use proptest::prelude::*;
use util::spd_matrix;

#[test]
fn schur_complement_without_interior_is_interface_block() {
    let k = spd_matrix(4, &[0.3, -1.2, 0.7, 2.0, 0.1]);
    let schur = schur_complement(0, &k, &[3, 1, 0], &[], 1e-12).unwrap();
    assert_eq!(schur, k.select_rows(&[3, 1, 0]).select_columns(&[3, 1, 0]));

    let condensation = condense(0, &k, &[0, 1, 2, 3], &[], 1e-12).unwrap();
    assert_eq!(condensation.schur, k);
    assert_eq!(condensation.num_interior(), 0);
    assert_eq!(condensation.extension.shape(), (0, 4));
    assert_eq!(condensation.lifting.shape(), (4, 0));
}

#[test]
fn singular_interior_block_is_reported() {
    // The last two slots refer to the same interior DOF, so D is singular
    #[rustfmt::skip]
    let k = DMatrix::from_row_slice(4, 4, &[
        4.0, 1.0, 1.0, 1.0,
        1.0, 4.0, 1.0, 1.0,
        1.0, 1.0, 2.0, 2.0,
        1.0, 1.0, 2.0, 2.0,
    ]);
    let result = condense(7, &k, &[0, 1], &[2, 3], 1e-12);
    assert!(matches!(result, Err(PreconditionerError::SingularLocalBlock { element_index: 7 })));
    let result = schur_complement(7, &k, &[0, 1], &[2, 3], 1e-12);
    assert!(matches!(result, Err(PreconditionerError::SingularLocalBlock { element_index: 7 })));
}

#[test]
fn try_invert_dense_rejects_near_singular_matrices() {
    let empty = DMatrix::<f64>::zeros(0, 0);
    assert_eq!(try_invert_dense(empty.clone(), 1e-12), Some(empty));

    let near_singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-15]);
    assert!(try_invert_dense(near_singular, 1e-12).is_none());
    assert!(try_invert_dense(DMatrix::<f64>::zeros(3, 3), 1e-12).is_none());

    let nan = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 0.0, 1.0]);
    assert!(try_invert_dense(nan, 1e-12).is_none());

    let diagonal = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![2.0, 4.0]));
    let inverse = try_invert_dense(diagonal, 1e-12).unwrap();
    assert_matrix_eq!(inverse, DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.25]), comp = abs, tol = 1e-15);
}

fn spd_with_partition() -> impl Strategy<Value = (DMatrix<f64>, Vec<usize>, Vec<usize>)> {
    (2usize..7)
        .prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec(-2.0..2.0, n * n),
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                1..n,
            )
        })
        .prop_map(|(n, values, permutation, num_interface)| {
            let k = spd_matrix(n, &values);
            let interface = permutation[..num_interface].to_vec();
            let interior = permutation[num_interface..].to_vec();
            (k, interface, interior)
        })
}

proptest! {
    #[test]
    fn schur_complement_is_inverse_of_inverse_block((k, interface, interior) in spd_with_partition()) {
        let condensation = condense(0, &k, &interface, &interior, 1e-12).unwrap();

        // The Schur complement is the inverse of the interface block of the inverse
        let k_inv = k.clone().try_inverse().unwrap();
        let expected = k_inv
            .select_rows(&interface)
            .select_columns(&interface)
            .try_inverse()
            .unwrap();
        assert_matrix_eq!(condensation.schur, expected, comp = abs, tol = 1e-8);

        let schur = schur_complement(0, &k, &interface, &interior, 1e-12).unwrap();
        assert_matrix_eq!(schur, condensation.schur, comp = abs, tol = 1e-10);

        // Symmetric matrices have lifting = extension^T
        assert_matrix_eq!(condensation.lifting, condensation.extension.transpose(), comp = abs, tol = 1e-10);

        let d = k.select_rows(&interior).select_columns(&interior);
        let identity = DMatrix::<f64>::identity(interior.len(), interior.len());
        assert_matrix_eq!(&d * &condensation.interior_inverse, identity, comp = abs, tol = 1e-10);
    }
}
