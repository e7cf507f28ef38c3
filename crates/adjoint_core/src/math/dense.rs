//! Dense matrices and LU factorisation with partial pivoting.
//!
//! This is the reference numerical backend behind
//! [`LinearSystemSolver`](crate::equation::LinearSystemSolver). It is
//! generic over [`num_traits::Float`] so derivative checks can run the same
//! factorisation on dual numbers.

use num_traits::Float;

use crate::error::{EquationError, EquationResult};

/// Row-major dense matrix.
///
/// # Example
///
/// ```
/// use adjoint_core::math::DenseMatrix;
///
/// let a = DenseMatrix::from_rows(vec![vec![2.0, 1.0], vec![1.0, 3.0]]).unwrap();
/// assert_eq!(a.matvec(&[1.0, 1.0]), vec![3.0, 4.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix<T: Float = f64> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Float> DenseMatrix<T> {
    /// Creates a zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    /// Creates the `n x n` identity.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = T::one();
        }
        m
    }

    /// Builds a matrix from rows of equal length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> EquationResult<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(EquationError::DimensionMismatch {
                    expected: n_cols,
                    found: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Builds a tridiagonal `n x n` matrix with constant bands.
    pub fn tridiagonal(n: usize, lower: T, diagonal: T, upper: T) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = diagonal;
            if i > 0 {
                m.data[i * n + i - 1] = lower;
            }
            if i + 1 < n {
                m.data[i * n + i + 1] = upper;
            }
        }
        m
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `true` for square matrices.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Entry at `(i, j)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        self.data[i * self.cols + j]
    }

    /// Sets the entry at `(i, j)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.data[i * self.cols + j] = value;
    }

    /// Returns `self * x`.
    pub fn matvec(&self, x: &[T]) -> Vec<T> {
        (0..self.rows)
            .map(|i| {
                let row = &self.data[i * self.cols..(i + 1) * self.cols];
                row.iter()
                    .zip(x)
                    .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
            })
            .collect()
    }

    /// Returns `self^T * x`.
    pub fn transpose_matvec(&self, x: &[T]) -> Vec<T> {
        let mut y = vec![T::zero(); self.cols];
        for (i, &xi) in x.iter().enumerate().take(self.rows) {
            let row = &self.data[i * self.cols..(i + 1) * self.cols];
            for (yj, &a) in y.iter_mut().zip(row) {
                *yj = *yj + a * xi;
            }
        }
        y
    }

    /// Returns `self + diag(d)`.
    pub fn with_added_diagonal(&self, d: &[T]) -> EquationResult<Self> {
        if !self.is_square() || d.len() != self.rows {
            return Err(EquationError::DimensionMismatch {
                expected: self.rows,
                found: d.len(),
            });
        }
        let mut m = self.clone();
        for (i, &di) in d.iter().enumerate() {
            m.data[i * self.cols + i] = m.data[i * self.cols + i] + di;
        }
        Ok(m)
    }
}

/// LU factorisation `PA = LU` of a square matrix.
///
/// # Example
///
/// ```
/// use adjoint_core::math::{DenseMatrix, LuFactorization};
///
/// let a = DenseMatrix::from_rows(vec![vec![0.0, 2.0], vec![1.0, 1.0]]).unwrap();
/// let lu = LuFactorization::factor(&a).unwrap();
/// let x: Vec<f64> = lu.solve(&[2.0, 2.0]);
/// assert!((x[0] - 1.0).abs() < 1e-14 && (x[1] - 1.0).abs() < 1e-14);
/// ```
#[derive(Clone, Debug)]
pub struct LuFactorization<T: Float = f64> {
    n: usize,
    lu: Vec<T>,
    pivots: Vec<usize>,
}

impl<T: Float> LuFactorization<T> {
    /// Factorises `a` with partial (row) pivoting.
    ///
    /// # Errors
    ///
    /// Returns [`EquationError::SingularMatrix`] on a zero pivot and
    /// [`EquationError::DimensionMismatch`] for non-square input.
    pub fn factor(a: &DenseMatrix<T>) -> EquationResult<Self> {
        if !a.is_square() {
            return Err(EquationError::DimensionMismatch {
                expected: a.rows(),
                found: a.cols(),
            });
        }
        let n = a.rows();
        let mut lu = a.data.clone();
        let mut pivots = Vec::with_capacity(n);

        for k in 0..n {
            let mut p = k;
            let mut max = lu[k * n + k].abs();
            for i in (k + 1)..n {
                let v = lu[i * n + k].abs();
                if v > max {
                    max = v;
                    p = i;
                }
            }
            if max == T::zero() {
                return Err(EquationError::SingularMatrix { column: k });
            }
            if p != k {
                for j in 0..n {
                    lu.swap(k * n + j, p * n + j);
                }
            }
            pivots.push(p);

            let pivot = lu[k * n + k];
            for i in (k + 1)..n {
                let factor = lu[i * n + k] / pivot;
                lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    lu[i * n + j] = lu[i * n + j] - factor * lu[k * n + j];
                }
            }
        }

        Ok(Self { n, lu, pivots })
    }

    /// Dimension of the factorised matrix.
    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solves `A x = b`.
    pub fn solve(&self, b: &[T]) -> Vec<T> {
        let n = self.n;
        let mut x = b.to_vec();
        for (k, &p) in self.pivots.iter().enumerate() {
            x.swap(k, p);
        }
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum = sum - self.lu[i * n + j] * x[j];
            }
            x[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum = sum - self.lu[i * n + j] * x[j];
            }
            x[i] = sum / self.lu[i * n + i];
        }
        x
    }

    /// Solves `A^T y = b`.
    pub fn solve_transpose(&self, b: &[T]) -> Vec<T> {
        let n = self.n;
        let mut y = b.to_vec();
        // U^T z = b
        for i in 0..n {
            let mut sum = y[i];
            for j in 0..i {
                sum = sum - self.lu[j * n + i] * y[j];
            }
            y[i] = sum / self.lu[i * n + i];
        }
        // L^T w = z
        for i in (0..n).rev() {
            let mut sum = y[i];
            for j in (i + 1)..n {
                sum = sum - self.lu[j * n + i] * y[j];
            }
            y[i] = sum;
        }
        for (k, &p) in self.pivots.iter().enumerate().rev() {
            y.swap(k, p);
        }
        y
    }
}
