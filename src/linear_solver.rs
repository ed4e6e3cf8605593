//! Dense n×n linear solve with partial pivoting.
//!
//! The algorithm treats this as an abstract collaborator: `solve(a, b) -> x`,
//! failing with [`SingularMatrix`]. `MatrixAssembler` and the outer solvers
//! never inspect the factorization itself.

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Raised when the system matrix has no pivot above tolerance in some column.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("matrix is singular to working precision")]
pub struct SingularMatrix;

const PIVOT_TOL: f64 = 1e-12;

/// Solve `a * x = b` for a dense, square, `n`×`n` system using Gaussian
/// elimination with partial pivoting. `a` and `b` are consumed (the
/// factorization is performed in place on owned copies) so that callers keep
/// their original common-block matrix untouched across retries.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, SingularMatrix> {
    let n = b.len();
    assert_eq!(a.nrows(), n);
    assert_eq!(a.ncols(), n);

    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        // partial pivot: largest magnitude in the remaining rows of this column
        let mut pivot_row = col;
        let mut pivot_val = m[[col, col]].abs();
        for row in (col + 1)..n {
            let v = m[[row, col]].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = row;
            }
        }
        if pivot_val < PIVOT_TOL {
            return Err(SingularMatrix);
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([col, k], [pivot_row, k]);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = m[[col, col]];
        for row in (col + 1)..n {
            let factor = m[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // back substitution
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut s = rhs[row];
        for k in (row + 1)..n {
            s -= m[[row, k]] * x[k];
        }
        x[row] = s / m[[row, row]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn solves_identity() {
        let a = Array2::eye(3);
        let b = array![1.0, 2.0, 3.0];
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0);
        assert_relative_eq!(x[1], 2.0);
        assert_relative_eq!(x[2], 3.0);
    }

    #[test]
    fn solves_with_pivoting() {
        // first pivot candidate (0,0) is zero: requires a row swap.
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(a.dot(&x)[0], b[0], epsilon = 1e-10);
        assert_relative_eq!(a.dot(&x)[1], b[1], epsilon = 1e-10);
    }

    #[test]
    fn reports_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];
        assert_eq!(solve(&a, &b), Err(SingularMatrix));
    }

    #[test]
    fn matches_known_solution() {
        let a = array![[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let b = array![8.0, -11.0, -3.0];
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-9);
        assert_relative_eq!(x[2], -1.0, epsilon = 1e-9);
    }
}
