//! Matrix generation and determinant.

use crate::det_stream::DetStream;
use lattice_types::{Hash, FORK_HEIGHT};

/// Matrix dimension for the random-matrix proof of work.
pub const MATRIX_DIM: usize = 30;

/// Seed a `dim × dim` matrix from a header hash, row-major.
///
/// The 32-byte hash is split into four 64-bit lanes. Row by row, the running
/// seed is XOR-folded with the lanes, a deterministic stream is reseeded
/// from it, and every cell drains the stream — first a wide draw that
/// threads the seed chain to the next row, then the cell value. Entries are
/// in `[0, 3)` post-fork and `[0, 2)` before.
pub fn generate_matrix(hash: &Hash, dim: usize, height: u64) -> Vec<f64> {
    let forked = height >= FORK_HEIGHT;
    let lanes: [i64; 4] = [
        hash.lane(0) as i64,
        hash.lane(1) as i64,
        hash.lane(2) as i64,
        hash.lane(3) as i64,
    ];

    let mut matrix = vec![0.0f64; dim * dim];
    let mut cur: i64 = 0;
    for i in 0..dim {
        cur ^= lanes[i % 4];
        let mut stream = if forked {
            DetStream::forked(cur)
        } else {
            DetStream::legacy(cur)
        };
        for j in 0..dim {
            if forked {
                cur = stream.int63n(i64::MAX);
                matrix[i * dim + j] = stream.int63n(3) as f64;
            } else {
                cur = stream.int63n((1i64 << 60) - 1);
                matrix[i * dim + j] = stream.int63n(2) as f64;
            }
        }
    }
    matrix
}

/// Determinant of a row-major `dim × dim` matrix by Gaussian elimination
/// with partial pivoting.
pub fn determinant(matrix: &[f64], dim: usize) -> f64 {
    debug_assert_eq!(matrix.len(), dim * dim);
    let mut m = matrix.to_vec();
    let mut det = 1.0f64;

    for col in 0..dim {
        // Pivot on the largest magnitude in this column.
        let mut pivot = col;
        for row in col + 1..dim {
            if m[row * dim + col].abs() > m[pivot * dim + col].abs() {
                pivot = row;
            }
        }

        if m[pivot * dim + col] == 0.0 {
            return 0.0;
        }

        if pivot != col {
            for k in 0..dim {
                m.swap(col * dim + k, pivot * dim + k);
            }
            det = -det;
        }

        let lead = m[col * dim + col];
        det *= lead;

        for row in col + 1..dim {
            let factor = m[row * dim + col] / lead;
            if factor == 0.0 {
                continue;
            }
            for k in col..dim {
                m[row * dim + k] -= factor * m[col * dim + k];
            }
        }
    }

    det
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinant_of_identity_is_one() {
        let dim = 5;
        let mut m = vec![0.0; dim * dim];
        for i in 0..dim {
            m[i * dim + i] = 1.0;
        }
        assert_eq!(determinant(&m, dim), 1.0);
    }

    #[test]
    fn determinant_of_singular_matrix_is_zero() {
        // Two equal rows.
        let m = vec![1.0, 2.0, 1.0, 2.0];
        assert_eq!(determinant(&m, 2), 0.0);
    }

    #[test]
    fn determinant_matches_cofactor_expansion_3x3() {
        let m = vec![2.0, -1.0, 0.0, 1.0, 3.0, 2.0, 0.0, 1.0, 4.0];
        // 2*(3*4-2*1) + 1*(1*4-2*0) + 0 = 20 + 4 = 24
        let det = determinant(&m, 3);
        assert!((det - 24.0).abs() < 1e-9);
    }

    #[test]
    fn matrix_is_reproducible_from_the_hash() {
        let hash = Hash::of_bytes(b"matrix seed");
        let a = generate_matrix(&hash, MATRIX_DIM, FORK_HEIGHT + 10);
        let b = generate_matrix(&hash, MATRIX_DIM, FORK_HEIGHT + 10);
        assert_eq!(a, b);
    }

    #[test]
    fn different_hashes_give_different_matrices() {
        let a = generate_matrix(&Hash::of_bytes(b"a"), MATRIX_DIM, FORK_HEIGHT + 10);
        let b = generate_matrix(&Hash::of_bytes(b"b"), MATRIX_DIM, FORK_HEIGHT + 10);
        assert_ne!(a, b);
    }

    #[test]
    fn fork_changes_the_generator_and_range() {
        let hash = Hash::of_bytes(b"fork check");
        let before = generate_matrix(&hash, MATRIX_DIM, FORK_HEIGHT - 1);
        let after = generate_matrix(&hash, MATRIX_DIM, FORK_HEIGHT);
        assert_ne!(before, after);
        assert!(before.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(after.iter().all(|&v| (0.0..3.0).contains(&v)));
    }
}
