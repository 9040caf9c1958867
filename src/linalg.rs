//! Determinants and adjugates of general NxN matrices stored row-major.
//!
//! Sizes 1 to 4 use closed-form expansions; larger sizes fall back to a
//! cofactor recursion along the first column. The adjugate satisfies
//! `M . adj(M) = det(M) . I`, so a Jacobian can be inverted without dividing
//! until the very end.

const fn det_3x3_part(m: &[f64], a: usize, b: usize, c: usize) -> f64 {
    m[a] * (m[3 + b] * m[6 + c] - m[3 + c] * m[6 + b])
}

const fn det_4x4_part(m: &[f64], j: usize, k: usize, p: usize, q: usize) -> f64 {
    (m[j * 4] * m[k * 4 + 1] - m[k * 4] * m[j * 4 + 1])
        * (m[p * 4 + 2] * m[q * 4 + 3] - m[q * 4 + 2] * m[p * 4 + 3])
}

/// Determinant of a 2x2 matrix
#[must_use]
pub const fn det_2x2(m: &[f64]) -> f64 {
    m[0] * m[3] - m[1] * m[2]
}

/// Determinant of a 3x3 matrix
#[must_use]
pub const fn det_3x3(m: &[f64]) -> f64 {
    det_3x3_part(m, 0, 1, 2) - det_3x3_part(m, 1, 0, 2) + det_3x3_part(m, 2, 0, 1)
}

/// Determinant of a 4x4 matrix
#[must_use]
pub const fn det_4x4(m: &[f64]) -> f64 {
    det_4x4_part(m, 0, 1, 2, 3) - det_4x4_part(m, 0, 2, 1, 3) + det_4x4_part(m, 0, 3, 1, 2)
        + det_4x4_part(m, 1, 2, 0, 3)
        - det_4x4_part(m, 1, 3, 0, 2)
        + det_4x4_part(m, 2, 3, 0, 1)
}

/// Determinant of an `n x n` matrix stored row-major.
/// A singular matrix yields 0; the caller is responsible for handling the
/// reciprocal downstream.
#[must_use]
pub fn determinant(m: &[f64], n: usize) -> f64 {
    assert_eq!(m.len(), n * n);
    match n {
        1 => m[0],
        2 => det_2x2(m),
        3 => det_3x3(m),
        4 => det_4x4(m),
        _ => {
            // Cofactor expansion along the first column
            let mut det = 0.0;
            let mut minor = vec![0.0; (n - 1) * (n - 1)];
            for row in 0..n {
                let sign = if row % 2 == 0 { 1.0 } else { -1.0 };
                let mut i0 = 0;
                for i in 0..n {
                    if i == row {
                        continue;
                    }
                    for j in 1..n {
                        minor[i0 * (n - 1) + j - 1] = m[i * n + j];
                    }
                    i0 += 1;
                }
                det += sign * determinant(&minor, n - 1) * m[row * n];
            }
            det
        }
    }
}

/// Adjugate (transpose of the cofactor matrix) of an `n x n` matrix
#[must_use]
pub fn adjugate(m: &[f64], n: usize) -> Vec<f64> {
    let mut adj = vec![0.0; n * n];
    adjugate_into(m, &mut adj, n);
    adj
}

/// In-place version of [`adjugate`]
pub fn adjugate_into(m: &[f64], adj: &mut [f64], n: usize) {
    assert_eq!(m.len(), n * n);
    assert_eq!(adj.len(), n * n);
    if n == 1 {
        adj[0] = 1.0;
        return;
    }

    let mut minor = vec![0.0; (n - 1) * (n - 1)];
    for row in 0..n {
        for col in 0..n {
            let sign = if (row + col) % 2 == 0 { 1.0 } else { -1.0 };
            // Minor matrix obtained by deleting (row, col)
            let mut i0 = 0;
            for i in 0..n {
                if i == row {
                    continue;
                }
                let mut j0 = 0;
                for j in 0..n {
                    if j == col {
                        continue;
                    }
                    minor[i0 * (n - 1) + j0] = m[i * n + j];
                    j0 += 1;
                }
                i0 += 1;
            }
            // The adjugate is the transpose of the cofactor matrix
            adj[col * n + row] = sign * determinant(&minor, n - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{adjugate, determinant};
    use crate::assert_delta;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n * n).map(|_| rng.random::<f64>() - 0.5).collect()
    }

    #[test]
    fn test_identity() {
        for n in 1..=6 {
            let mut m = vec![0.0; n * n];
            for i in 0..n {
                m[i * n + i] = 1.0;
            }
            assert_delta!(determinant(&m, n), 1.0, 1e-14);
        }
    }

    #[test]
    fn test_known_3x3() {
        let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0];
        assert_delta!(determinant(&m, 3), -3.0, 1e-12);
    }

    #[test]
    fn test_triangular() {
        // The determinant of a triangular matrix is the product of the
        // diagonal entries
        let mut rng = StdRng::seed_from_u64(1234);
        for n in 2..=6 {
            let mut m = vec![0.0; n * n];
            let mut prod = 1.0;
            for i in 0..n {
                for j in i..n {
                    m[i * n + j] = rng.random::<f64>() + 0.5;
                }
                prod *= m[i * n + i];
            }
            assert_delta!(determinant(&m, n), prod, 1e-12);
        }
    }

    #[test]
    fn test_singular() {
        let mut rng = StdRng::seed_from_u64(1234);
        for n in 2..=6 {
            let mut m = random_matrix(&mut rng, n);
            // Duplicate the first row into the last
            for j in 0..n {
                m[(n - 1) * n + j] = m[j];
            }
            assert_delta!(determinant(&m, n), 0.0, 1e-12);
        }
    }

    #[test]
    fn test_adjugate_identity() {
        let mut rng = StdRng::seed_from_u64(5678);
        for n in 1..=6 {
            let m = random_matrix(&mut rng, n);
            let det = determinant(&m, n);
            let adj = adjugate(&m, n);
            // M . adj(M) = det(M) . I
            for i in 0..n {
                for j in 0..n {
                    let mut x = 0.0;
                    for k in 0..n {
                        x += m[i * n + k] * adj[k * n + j];
                    }
                    let expected = if i == j { det } else { 0.0 };
                    assert_delta!(x, expected, 1e-12);
                }
            }
        }
    }
}
