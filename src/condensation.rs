//! Static condensation of element matrices.
//!
//! An element matrix is partitioned into interface slots (kept) and interior slots
//! (eliminated):
//!
//! ```text
//! K = [ A  B ]   A: interface x interface,  B: interface x interior,
//!     [ C  D ]   C: interior x interface,   D: interior x interior.
//! ```
//!
//! Eliminating the interior slots yields the Schur complement $A' = A - B D^{-1} C$.
//! For the BDDC preconditioner we additionally keep $D^{-1}$, the extension operator
//! $E = D^{-1} C$ and the lifting operator $F = B D^{-1}$.
use crate::error::PreconditionerError;
use nalgebra::{ComplexField, DMatrix};

/// Default relative pivot tolerance below which a dense block is considered singular.
pub const DEFAULT_SINGULARITY_TOLERANCE: f64 = 1e-12;

/// The result of eliminating the interior slots of a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCondensation {
    /// Schur complement $A - B D^{-1} C$ on the interface slots.
    pub schur: DMatrix<f64>,
    /// $D^{-1}$.
    pub interior_inverse: DMatrix<f64>,
    /// $E = D^{-1} C$, interior x interface.
    pub extension: DMatrix<f64>,
    /// $F = B D^{-1}$, interface x interior. Equal to $E^T$ for symmetric element matrices.
    pub lifting: DMatrix<f64>,
}

impl LocalCondensation {
    pub fn num_interface(&self) -> usize {
        self.schur.nrows()
    }

    pub fn num_interior(&self) -> usize {
        self.interior_inverse.nrows()
    }
}

/// Invert a dense matrix through its LU decomposition.
///
/// Returns `None` if the smallest pivot modulus is below `tolerance` times the largest, or if
/// the inverse contains non-finite entries. An empty matrix is its own inverse.
pub fn try_invert_dense<T: ComplexField>(matrix: DMatrix<T>, tolerance: T::RealField) -> Option<DMatrix<T>> {
    if matrix.is_empty() {
        return Some(matrix);
    }

    let lu = matrix.lu();
    let pivots: Vec<T::RealField> = lu.u().diagonal().iter().map(|p| p.clone().modulus()).collect();
    let mut min_pivot = pivots[0].clone();
    let mut max_pivot = pivots[0].clone();
    for pivot in &pivots[1..] {
        // NaN pivots fail the comparisons and are caught by the finiteness check
        if !(*pivot >= min_pivot) {
            min_pivot = pivot.clone();
        }
        if *pivot > max_pivot {
            max_pivot = pivot.clone();
        }
    }
    if !(max_pivot > nalgebra::zero::<T::RealField>()) || !min_pivot.is_finite() || min_pivot <= tolerance * max_pivot {
        return None;
    }

    lu.try_inverse()
        .filter(|inverse| inverse.iter().all(|x| x.is_finite()))
}

fn extract_blocks(
    element_matrix: &DMatrix<f64>,
    interface_slots: &[usize],
    interior_slots: &[usize],
) -> [DMatrix<f64>; 4] {
    let interface_rows = element_matrix.select_rows(interface_slots);
    let interior_rows = element_matrix.select_rows(interior_slots);
    let a = interface_rows.select_columns(interface_slots);
    let b = interface_rows.select_columns(interior_slots);
    let c = interior_rows.select_columns(interface_slots);
    let d = interior_rows.select_columns(interior_slots);
    [a, b, c, d]
}

/// Compute the Schur complement of the interior slots of an element matrix.
///
/// If there are no interior slots, the result is the interface block itself.
pub fn schur_complement(
    element_index: usize,
    element_matrix: &DMatrix<f64>,
    interface_slots: &[usize],
    interior_slots: &[usize],
    tolerance: f64,
) -> Result<DMatrix<f64>, PreconditionerError> {
    let [mut a, b, c, d] = extract_blocks(element_matrix, interface_slots, interior_slots);
    if interior_slots.is_empty() {
        return Ok(a);
    }

    let d_inv = try_invert_dense(d, tolerance).ok_or(PreconditionerError::SingularLocalBlock { element_index })?;
    let extension = d_inv * c;
    a.gemm(-1.0, &b, &extension, 1.0);
    Ok(a)
}

/// Eliminate the interior slots of an element matrix, retaining the operators needed to
/// apply the elimination to vectors later.
pub fn condense(
    element_index: usize,
    element_matrix: &DMatrix<f64>,
    interface_slots: &[usize],
    interior_slots: &[usize],
    tolerance: f64,
) -> Result<LocalCondensation, PreconditionerError> {
    let [mut a, b, c, d] = extract_blocks(element_matrix, interface_slots, interior_slots);
    let interior_inverse =
        try_invert_dense(d, tolerance).ok_or(PreconditionerError::SingularLocalBlock { element_index })?;
    let extension = &interior_inverse * c;
    let lifting = &b * &interior_inverse;
    a.gemm(-1.0, &b, &extension, 1.0);
    Ok(LocalCondensation {
        schur: a,
        interior_inverse,
        extension,
        lifting,
    })
}
