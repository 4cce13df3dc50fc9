//! Bridge between `ndarray` storage and `faer` factorizations.
//!
//! The optimizer keeps its state in `ndarray` arrays and only crosses into
//! `faer` to factor the symmetric positive definite information matrix.

use faer::linalg::solvers::{Llt, LltError, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    NotPositiveDefinite(LltError),
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("right-hand side has length {found}, expected {expected}")]
    RhsLength { expected: usize, found: usize },
}

/// Borrows contiguous arrays in place and copies anything else.
enum FaerMatrix<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

impl<'a> FaerMatrix<'a> {
    fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        match array.as_slice_memory_order() {
            Some(slice) if array.is_standard_layout() => {
                FaerMatrix::Borrowed(MatRef::from_row_major_slice(slice, rows, cols))
            }
            Some(slice) if array.t().is_standard_layout() => {
                FaerMatrix::Borrowed(MatRef::from_column_major_slice(slice, rows, cols))
            }
            _ => FaerMatrix::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        }
    }

    fn as_ref(&self) -> MatRef<'_, f64> {
        match self {
            FaerMatrix::Borrowed(view) => *view,
            FaerMatrix::Owned(mat) => mat.as_ref(),
        }
    }
}

/// Cholesky factor `A = L Lᵀ` of a symmetric positive definite matrix.
pub struct SpdFactor {
    llt: Llt<f64>,
    dim: usize,
}

impl SpdFactor {
    pub fn new<S: Data<Elem = f64>>(matrix: &ArrayBase<S, Ix2>) -> Result<Self, LinalgError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(LinalgError::NotSquare { rows, cols });
        }
        let llt = FaerMatrix::new(matrix)
            .as_ref()
            .llt(Side::Lower)
            .map_err(LinalgError::NotPositiveDefinite)?;
        Ok(Self { llt, dim: rows })
    }

    /// Solves `A x = rhs`.
    pub fn solve(&self, rhs: &Array1<f64>) -> Result<Array1<f64>, LinalgError> {
        if rhs.len() != self.dim {
            return Err(LinalgError::RhsLength {
                expected: self.dim,
                found: rhs.len(),
            });
        }
        let rhs = Mat::from_fn(self.dim, 1, |i, _| rhs[i]);
        let solution = self.llt.solve(rhs.as_ref());
        Ok(Array1::from_shape_fn(self.dim, |i| solution[(i, 0)]))
    }
}
