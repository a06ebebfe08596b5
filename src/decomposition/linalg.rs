//! Small dense linear-algebra kernels used by the randomized SVD

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use std::f64::consts::PI;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOL: f64 = 1e-14;

/// Matrix of independent standard normal draws (Box-Muller)
pub fn gaussian_matrix<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    })
}

/// Orthonormalize the columns of `a` in place with modified Gram-Schmidt.
///
/// Two passes are made for numerical stability. Columns that become
/// (numerically) zero are left as zero vectors.
pub fn orthonormalize(a: &mut Array2<f64>) {
    for _ in 0..2 {
        let n_cols = a.ncols();
        for j in 0..n_cols {
            for i in 0..j {
                let proj = a.column(i).dot(&a.column(j));
                let qi = a.column(i).to_owned();
                a.column_mut(j).scaled_add(-proj, &qi);
            }

            let norm = a.column(j).dot(&a.column(j)).sqrt();
            if norm > 1e-12 {
                a.column_mut(j).mapv_inplace(|v| v / norm);
            } else {
                a.column_mut(j).fill(0.0);
            }
        }
    }
}

/// Eigen decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// columns.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale = a.iter().map(|x| x * x).sum::<f64>().sqrt().max(f64::MIN_POSITIVE);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| (0..n).filter(move |&q| q != p).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]] * a[[p, q]])
            .sum::<f64>()
            .sqrt();
        if off <= JACOBI_TOL * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]).then(i.cmp(&j)));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let vectors = v.select(Axis(1), &order);
    (values, vectors)
}

/// Flip each row so its largest-magnitude entry is positive
pub fn flip_rows_by_max_abs(rows: &mut Array2<f64>) {
    for mut row in rows.rows_mut() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
        if pivot < 0.0 {
            row.mapv_inplace(|x| -x);
        }
    }
}

/// Population variance of each column of a dense matrix
pub fn column_variances(a: &Array2<f64>) -> Array1<f64> {
    a.var_axis(Axis(0), 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_orthonormalize() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut a = gaussian_matrix(20, 5, &mut rng);
        orthonormalize(&mut a);

        let gram = a.t().dot(&a);
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_symmetric_eigen() {
        let m = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.0], [0.0, 0.0, 1.0]];
        let (values, vectors) = symmetric_eigen(&m);

        assert!(values[0] >= values[1] && values[1] >= values[2]);
        for k in 0..3 {
            let v = vectors.column(k);
            let mv = m.dot(&v);
            for i in 0..3 {
                assert!((mv[i] - values[k] * v[i]).abs() < 1e-9);
            }
        }
        assert!((values[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flip_rows() {
        let mut m = array![[0.1, -0.9], [0.5, 0.2]];
        flip_rows_by_max_abs(&mut m);
        assert_eq!(m, array![[-0.1, 0.9], [0.5, 0.2]]);
    }

    #[test]
    fn test_gaussian_is_seeded() {
        let a = gaussian_matrix(3, 3, &mut ChaCha8Rng::seed_from_u64(9));
        let b = gaussian_matrix(3, 3, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
