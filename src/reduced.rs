//! The reduced (inexact Schur complement) system on the interface DOFs.
use crate::options::MatrixStorage;
use log::debug;
use nalgebra::DMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use rayon::prelude::*;

/// A dense element contribution to a [`ReducedSystem`].
///
/// `rows[k]` is the reduced (coarse) index of row/column `k` of `block`.
#[derive(Debug, Clone, Copy)]
pub struct ElementContribution<'a> {
    pub rows: &'a [usize],
    pub block: &'a DMatrix<f64>,
}

/// For every row of a matrix, the (element, local index) pairs that touch it.
///
/// Entries of a row are ordered by element index, which makes accumulation along a row
/// independent of scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Incidence {
    offsets: Vec<usize>,
    entries: Vec<(usize, usize)>,
}

impl Incidence {
    pub fn from_element_rows<'a>(num_rows: usize, element_rows: impl Clone + Iterator<Item = &'a [usize]>) -> Self {
        let mut counts = vec![0; num_rows + 1];
        for rows in element_rows.clone() {
            for &row in rows {
                counts[row + 1] += 1;
            }
        }
        for i in 0..num_rows {
            counts[i + 1] += counts[i];
        }

        let offsets = counts;
        let mut fill = offsets.clone();
        let mut entries = vec![(0, 0); offsets[num_rows]];
        for (element_index, rows) in element_rows.enumerate() {
            for (local_index, &row) in rows.iter().enumerate() {
                entries[fill[row]] = (element_index, local_index);
                fill[row] += 1;
            }
        }

        Self { offsets, entries }
    }

    pub fn row(&self, row: usize) -> &[(usize, usize)] {
        &self.entries[self.offsets[row]..self.offsets[row + 1]]
    }
}

/// Split `values` into consecutive mutable chunks of the given lengths.
pub(crate) fn split_into_chunks<'a, T>(mut values: &'a mut [T], lengths: impl Iterator<Item = usize>) -> Vec<&'a mut [T]> {
    let mut chunks = Vec::new();
    for len in lengths {
        let (chunk, remainder) = std::mem::take(&mut values).split_at_mut(len);
        chunks.push(chunk);
        values = remainder;
    }
    chunks
}

/// Sparse matrix over the interface DOFs, accumulated from element Schur complements.
///
/// With [`MatrixStorage::Symmetric`] only the lower triangle (row >= column) is stored.
/// The diagonal is always part of the sparsity pattern. Rows that no element contributes to
/// are pinned to the identity. Any other singularity is left for the factorization to report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedSystem {
    storage: MatrixStorage,
    matrix: CsrMatrix<f64>,
    pinned_rows: Vec<usize>,
}

impl ReducedSystem {
    /// Accumulate element contributions into a new reduced system with `num_rows` rows.
    ///
    /// Every row is owned by exactly one task, which sums the contributions to that row in
    /// element order. No two tasks ever write to the same entry.
    pub fn assemble(num_rows: usize, storage: MatrixStorage, contributions: &[ElementContribution]) -> Self {
        let symmetric = storage == MatrixStorage::Symmetric;
        let keep = |row: usize, col: usize| !symmetric || row >= col;

        for contribution in contributions {
            assert_eq!(contribution.rows.len(), contribution.block.nrows());
            assert_eq!(contribution.rows.len(), contribution.block.ncols());
            assert!(contribution.rows.iter().all(|&row| row < num_rows));
        }

        // Sparsity pattern from all (row, col) pairs
        let mut coordinates: Vec<(usize, usize)> = (0..num_rows).map(|i| (i, i)).collect();
        for contribution in contributions {
            for &row in contribution.rows {
                for &col in contribution.rows {
                    if keep(row, col) {
                        coordinates.push((row, col));
                    }
                }
            }
        }
        coordinates.par_sort_unstable();
        coordinates.dedup();

        let mut offsets = vec![0; num_rows + 1];
        for &(i, _) in &coordinates {
            offsets[i + 1] += 1;
        }
        for i in 0..num_rows {
            offsets[i + 1] += offsets[i];
        }
        let column_indices: Vec<usize> = coordinates.into_iter().map(|(_, j)| j).collect();
        let pattern = SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
            .expect("Internal error: Reduced system pattern is valid by construction");

        let incidence = Incidence::from_element_rows(num_rows, contributions.iter().map(|c| c.rows));
        let mut values = vec![0.0; pattern.nnz()];
        let row_lengths = (0..num_rows).map(|row| pattern.lane(row).len());
        let row_values = split_into_chunks(&mut values, row_lengths);

        row_values
            .into_par_iter()
            .enumerate()
            .for_each(|(row, row_values)| {
                let cols = pattern.lane(row);
                let contributing = incidence.row(row);
                for &(element_index, k) in contributing {
                    let contribution = &contributions[element_index];
                    for (l, &col) in contribution.rows.iter().enumerate() {
                        if keep(row, col) {
                            let idx = cols
                                .binary_search(&col)
                                .expect("Internal error: Column must be part of the pattern");
                            row_values[idx] += contribution.block[(k, l)];
                        }
                    }
                }

                // Rows no element references are decoupled from the rest of the system
                if contributing.is_empty() {
                    let diag_idx = cols
                        .binary_search(&row)
                        .expect("Internal error: Diagonal must be part of the pattern");
                    row_values[diag_idx] = 1.0;
                }
            });

        let pinned_rows: Vec<usize> = (0..num_rows)
            .filter(|&row| incidence.row(row).is_empty())
            .collect();
        if !pinned_rows.is_empty() {
            debug!("Pinned {} unreferenced rows of the reduced system to identity", pinned_rows.len());
        }

        let matrix = CsrMatrix::try_from_pattern_and_values(pattern, values)
            .expect("Internal error: Value count matches the pattern");

        Self {
            storage,
            matrix,
            pinned_rows,
        }
    }

    pub fn storage(&self) -> MatrixStorage {
        self.storage
    }

    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    /// The stored matrix. For symmetric storage, this is only the lower triangle.
    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    /// Rows that no element contributes to, pinned to the identity.
    pub fn pinned_rows(&self) -> &[usize] {
        &self.pinned_rows
    }

    /// The value of entry `(i, j)` of the full (not just stored) matrix.
    pub fn entry(&self, i: usize, j: usize) -> f64 {
        let (i, j) = match self.storage {
            MatrixStorage::Symmetric if j > i => (j, i),
            _ => (i, j),
        };
        self.matrix
            .get_entry(i, j)
            .map(|entry| entry.into_value())
            .unwrap_or(0.0)
    }

    fn full_coo(&self) -> CooMatrix<f64> {
        let n = self.nrows();
        let mut coo = CooMatrix::new(n, n);
        for (i, j, &v) in self.matrix.triplet_iter() {
            coo.push(i, j, v);
            if self.storage == MatrixStorage::Symmetric && i != j {
                coo.push(j, i, v);
            }
        }
        coo
    }

    /// The full matrix in CSC format, with the upper triangle restored for symmetric storage.
    pub fn to_full_csc(&self) -> CscMatrix<f64> {
        CscMatrix::from(&self.full_coo())
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from(&self.full_coo())
    }
}
