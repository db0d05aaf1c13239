//! Composable linear operators over dense column blocks.
//!
//! Rate matrices are never densified on the hot path. An operator only needs
//! to act on an `(n, k)` block from the left (`apply`), act through its
//! transpose (`apply_transpose`), and report cheap 1-norm and ∞-norm values.
//! Primitive operators report exact norms; compositions (powers, sums)
//! report submultiplicative / triangle-inequality upper bounds.
//!
//! The block-augmented operators carry an auxiliary "expectation" copy of the
//! state space. Exponentiating
//!
//! ```text
//! M = | Q  E |
//!     | 0  Q |
//! ```
//!
//! gives `expm(M) = [[expm(Q), L(Q, E)], [0, expm(Q)]]`, where `L` is the
//! Fréchet derivative of the exponential at `Q` in direction `E`.

use ndarray::{Array1, Array2, ArrayView2, Axis, s};

use crate::error::{CtmcError, CtmcResult};
use crate::sparse::CsrMatrix;

/// Real linear operator acting on dense blocks of column vectors.
pub trait LinearOperator: std::fmt::Debug + Send + Sync {
    /// `(rows, cols)` of the represented matrix.
    fn shape(&self) -> (usize, usize);

    /// `A · B` without shape checks; `B` has `cols` rows.
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64>;

    /// `Aᵀ · B` without shape checks; `B` has `rows` rows.
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64>;

    fn one_norm(&self) -> f64;

    fn inf_norm(&self) -> f64;

    fn trace(&self) -> f64 {
        self.to_dense().diag().sum()
    }

    fn dot(&self, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        let (_, cols) = self.shape();
        if b.nrows() != cols {
            return Err(CtmcError::ShapeMismatch {
                context: "operator dot",
                expected: cols,
                actual: b.nrows(),
            });
        }
        Ok(self.apply(b))
    }

    fn tdot(&self, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        let (rows, _) = self.shape();
        if b.nrows() != rows {
            return Err(CtmcError::ShapeMismatch {
                context: "operator transpose dot",
                expected: rows,
                actual: b.nrows(),
            });
        }
        Ok(self.apply_transpose(b))
    }

    /// Adjoint action; identical to [`LinearOperator::tdot`] for real operators.
    fn hdot(&self, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        self.tdot(b)
    }

    fn to_dense(&self) -> Array2<f64> {
        let (_, cols) = self.shape();
        self.apply(Array2::eye(cols).view())
    }

    /// Transpose view borrowing this operator.
    fn t(&self) -> Transposed<&Self>
    where
        Self: Sized,
    {
        Transposed::new(self)
    }

    /// Conjugate-transpose view; the transpose for real operators.
    fn h(&self) -> Transposed<&Self>
    where
        Self: Sized,
    {
        Transposed::new(self)
    }
}

impl<T: LinearOperator + ?Sized> LinearOperator for &T {
    fn shape(&self) -> (usize, usize) {
        (**self).shape()
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        (**self).apply(b)
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        (**self).apply_transpose(b)
    }
    fn one_norm(&self) -> f64 {
        (**self).one_norm()
    }
    fn inf_norm(&self) -> f64 {
        (**self).inf_norm()
    }
    fn trace(&self) -> f64 {
        (**self).trace()
    }
}

impl<T: LinearOperator + ?Sized> LinearOperator for Box<T> {
    fn shape(&self) -> (usize, usize) {
        (**self).shape()
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        (**self).apply(b)
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        (**self).apply_transpose(b)
    }
    fn one_norm(&self) -> f64 {
        (**self).one_norm()
    }
    fn inf_norm(&self) -> f64 {
        (**self).inf_norm()
    }
    fn trace(&self) -> f64 {
        (**self).trace()
    }
}

fn max_or_zero(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().fold(0.0, f64::max)
}

// ---- Primitive operators ----

/// Dense matrix operator.
#[derive(Debug, Clone)]
pub struct DenseOperator {
    a: Array2<f64>,
}

impl DenseOperator {
    pub fn new(a: Array2<f64>) -> Self {
        Self { a }
    }
}

impl LinearOperator for DenseOperator {
    fn shape(&self) -> (usize, usize) {
        self.a.dim()
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.a.dot(&b)
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.a.t().dot(&b)
    }
    fn one_norm(&self) -> f64 {
        max_or_zero(self.a.mapv(f64::abs).sum_axis(Axis(0)))
    }
    fn inf_norm(&self) -> f64 {
        max_or_zero(self.a.mapv(f64::abs).sum_axis(Axis(1)))
    }
    fn to_dense(&self) -> Array2<f64> {
        self.a.clone()
    }
}

/// Sparse matrix operator.
#[derive(Debug, Clone)]
pub struct MatrixOperator {
    a: CsrMatrix,
}

impl MatrixOperator {
    pub fn new(a: CsrMatrix) -> Self {
        Self { a }
    }
}

impl LinearOperator for MatrixOperator {
    fn shape(&self) -> (usize, usize) {
        self.a.shape()
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.a.dot(b)
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.a.tdot(b)
    }
    fn one_norm(&self) -> f64 {
        max_or_zero(self.a.abs_col_sums())
    }
    fn inf_norm(&self) -> f64 {
        max_or_zero(self.a.abs_row_sums())
    }
    fn trace(&self) -> f64 {
        self.a.diagonal().sum()
    }
    fn to_dense(&self) -> Array2<f64> {
        self.a.to_dense()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityOperator {
    n: usize,
}

impl IdentityOperator {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl LinearOperator for IdentityOperator {
    fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        b.to_owned()
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        b.to_owned()
    }
    fn one_norm(&self) -> f64 {
        if self.n == 0 { 0.0 } else { 1.0 }
    }
    fn inf_norm(&self) -> f64 {
        self.one_norm()
    }
    fn trace(&self) -> f64 {
        self.n as f64
    }
}

/// `R + diag(d)` for a sparse `R`.
///
/// With `R` holding off-diagonal rates and `d = -R·1` this is a CTMC
/// generator.
#[derive(Debug, Clone)]
pub struct RdOperator {
    r: CsrMatrix,
    d: Array1<f64>,
}

impl RdOperator {
    pub fn new(r: CsrMatrix, d: Array1<f64>) -> CtmcResult<Self> {
        let (rows, cols) = r.shape();
        if rows != cols {
            return Err(CtmcError::NotSquare { rows, cols });
        }
        if d.len() != rows {
            return Err(CtmcError::ShapeMismatch {
                context: "Rd diagonal",
                expected: rows,
                actual: d.len(),
            });
        }
        Ok(Self { r, d })
    }

    pub fn order(&self) -> usize {
        self.d.len()
    }

    pub fn rates(&self) -> &CsrMatrix {
        &self.r
    }

    pub fn diag(&self) -> &Array1<f64> {
        &self.d
    }

    /// The same operator with `mu` subtracted from the diagonal.
    pub fn shifted(&self, mu: f64) -> Self {
        Self {
            r: self.r.clone(),
            d: self.d.mapv(|v| v - mu),
        }
    }

    fn full_diagonal(&self) -> Array1<f64> {
        &self.r.diagonal() + &self.d
    }

    /// Absolute column sums of `R + diag(d)`.
    pub fn abs_col_sums(&self) -> Array1<f64> {
        self.r.offdiag_abs_col_sums() + self.full_diagonal().mapv(f64::abs)
    }

    /// Absolute row sums of `R + diag(d)`.
    pub fn abs_row_sums(&self) -> Array1<f64> {
        self.r.offdiag_abs_row_sums() + self.full_diagonal().mapv(f64::abs)
    }
}

impl LinearOperator for RdOperator {
    fn shape(&self) -> (usize, usize) {
        (self.d.len(), self.d.len())
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = self.r.dot(b);
        out += &(&b * &self.d.view().insert_axis(Axis(1)));
        out
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = self.r.tdot(b);
        out += &(&b * &self.d.view().insert_axis(Axis(1)));
        out
    }
    fn one_norm(&self) -> f64 {
        max_or_zero(self.abs_col_sums())
    }
    fn inf_norm(&self) -> f64 {
        max_or_zero(self.abs_row_sums())
    }
    fn trace(&self) -> f64 {
        self.full_diagonal().sum()
    }
}

/// `[[Q, diag(c)], [0, Q]]` with `Q` an [`RdOperator`].
///
/// Exponentiating this operator carries the expected integral of `c` over
/// the path (dwell-time functionals) in the upper-right block.
#[derive(Debug, Clone)]
pub struct RdcOperator {
    rd: RdOperator,
    c: Array1<f64>,
}

impl RdcOperator {
    pub fn new(rd: RdOperator, c: Array1<f64>) -> CtmcResult<Self> {
        if c.len() != rd.order() {
            return Err(CtmcError::ShapeMismatch {
                context: "Rdc coupling vector",
                expected: rd.order(),
                actual: c.len(),
            });
        }
        Ok(Self { rd, c })
    }
}

impl LinearOperator for RdcOperator {
    fn shape(&self) -> (usize, usize) {
        let n = 2 * self.rd.order();
        (n, n)
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let n = self.rd.order();
        let b1 = b.slice(s![..n, ..]);
        let b2 = b.slice(s![n.., ..]);
        let mut out = Array2::zeros((2 * n, b.ncols()));
        let mut top = self.rd.apply(b1);
        top += &(&b2 * &self.c.view().insert_axis(Axis(1)));
        out.slice_mut(s![..n, ..]).assign(&top);
        out.slice_mut(s![n.., ..]).assign(&self.rd.apply(b2));
        out
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let n = self.rd.order();
        let b1 = b.slice(s![..n, ..]);
        let b2 = b.slice(s![n.., ..]);
        let mut out = Array2::zeros((2 * n, b.ncols()));
        out.slice_mut(s![..n, ..])
            .assign(&self.rd.apply_transpose(b1));
        let mut bottom = self.rd.apply_transpose(b2);
        bottom += &(&b1 * &self.c.view().insert_axis(Axis(1)));
        out.slice_mut(s![n.., ..]).assign(&bottom);
        out
    }
    fn one_norm(&self) -> f64 {
        max_or_zero(self.rd.abs_col_sums() + self.c.mapv(f64::abs))
    }
    fn inf_norm(&self) -> f64 {
        max_or_zero(self.rd.abs_row_sums() + self.c.mapv(f64::abs))
    }
    fn trace(&self) -> f64 {
        2.0 * self.rd.trace()
    }
}

/// `[[Q, C], [0, Q]]` with `Q` an [`RdOperator`] and sparse coupling `C`.
///
/// With `C` holding labeled transition rates, the upper-right block of the
/// exponential carries expected labeled transition counts.
#[derive(Debug, Clone)]
pub struct RdCOperator {
    rd: RdOperator,
    c: CsrMatrix,
}

impl RdCOperator {
    pub fn new(rd: RdOperator, c: CsrMatrix) -> CtmcResult<Self> {
        let n = rd.order();
        let (rows, cols) = c.shape();
        if rows != cols {
            return Err(CtmcError::NotSquare { rows, cols });
        }
        if rows != n {
            return Err(CtmcError::ShapeMismatch {
                context: "RdC coupling matrix",
                expected: n,
                actual: rows,
            });
        }
        Ok(Self { rd, c })
    }
}

impl LinearOperator for RdCOperator {
    fn shape(&self) -> (usize, usize) {
        let n = 2 * self.rd.order();
        (n, n)
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let n = self.rd.order();
        let b1 = b.slice(s![..n, ..]);
        let b2 = b.slice(s![n.., ..]);
        let mut out = Array2::zeros((2 * n, b.ncols()));
        let top = self.rd.apply(b1) + self.c.dot(b2);
        out.slice_mut(s![..n, ..]).assign(&top);
        out.slice_mut(s![n.., ..]).assign(&self.rd.apply(b2));
        out
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let n = self.rd.order();
        let b1 = b.slice(s![..n, ..]);
        let b2 = b.slice(s![n.., ..]);
        let mut out = Array2::zeros((2 * n, b.ncols()));
        out.slice_mut(s![..n, ..])
            .assign(&self.rd.apply_transpose(b1));
        let bottom = self.rd.apply_transpose(b2) + self.c.tdot(b1);
        out.slice_mut(s![n.., ..]).assign(&bottom);
        out
    }
    fn one_norm(&self) -> f64 {
        max_or_zero(self.rd.abs_col_sums() + self.c.abs_col_sums())
    }
    fn inf_norm(&self) -> f64 {
        max_or_zero(self.rd.abs_row_sums() + self.c.abs_row_sums())
    }
    fn trace(&self) -> f64 {
        2.0 * self.rd.trace()
    }
}

// ---- Diagonal shifts ----

/// Operators that absorb `A - mu·I` into their own diagonal, keeping exact norms.
pub trait DiagonalShift: LinearOperator + Clone + Sized {
    fn shifted(&self, mu: f64) -> Self;
}

impl DiagonalShift for DenseOperator {
    fn shifted(&self, mu: f64) -> Self {
        let mut a = self.a.clone();
        a.diag_mut().mapv_inplace(|v| v - mu);
        Self { a }
    }
}

impl DiagonalShift for RdOperator {
    fn shifted(&self, mu: f64) -> Self {
        RdOperator::shifted(self, mu)
    }
}

impl DiagonalShift for RdcOperator {
    fn shifted(&self, mu: f64) -> Self {
        Self {
            rd: self.rd.shifted(mu),
            c: self.c.clone(),
        }
    }
}

impl DiagonalShift for RdCOperator {
    fn shifted(&self, mu: f64) -> Self {
        Self {
            rd: self.rd.shifted(mu),
            c: self.c.clone(),
        }
    }
}

// ---- Compositions ----

/// `op^p`, applied as `p` successive products.
#[derive(Debug, Clone)]
pub struct PowerOperator<O> {
    op: O,
    p: u32,
}

impl<O: LinearOperator> PowerOperator<O> {
    pub fn new(op: O, p: u32) -> CtmcResult<Self> {
        let (rows, cols) = op.shape();
        if rows != cols {
            return Err(CtmcError::NotSquare { rows, cols });
        }
        Ok(Self { op, p })
    }
}

impl<O: LinearOperator> LinearOperator for PowerOperator<O> {
    fn shape(&self) -> (usize, usize) {
        self.op.shape()
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = b.to_owned();
        for _ in 0..self.p {
            out = self.op.apply(out.view());
        }
        out
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = b.to_owned();
        for _ in 0..self.p {
            out = self.op.apply_transpose(out.view());
        }
        out
    }
    fn one_norm(&self) -> f64 {
        self.op.one_norm().powi(self.p as i32)
    }
    fn inf_norm(&self) -> f64 {
        self.op.inf_norm().powi(self.p as i32)
    }
}

/// `alpha · op`.
#[derive(Debug, Clone)]
pub struct ScaledOperator<O> {
    op: O,
    alpha: f64,
}

impl<O: LinearOperator> ScaledOperator<O> {
    pub fn new(op: O, alpha: f64) -> Self {
        Self { op, alpha }
    }
}

impl<O: LinearOperator> LinearOperator for ScaledOperator<O> {
    fn shape(&self) -> (usize, usize) {
        self.op.shape()
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.op.apply(b) * self.alpha
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.op.apply_transpose(b) * self.alpha
    }
    fn one_norm(&self) -> f64 {
        self.alpha.abs() * self.op.one_norm()
    }
    fn inf_norm(&self) -> f64 {
        self.alpha.abs() * self.op.inf_norm()
    }
    fn trace(&self) -> f64 {
        self.alpha * self.op.trace()
    }
}

/// `a + b` for operators of equal shape.
#[derive(Debug, Clone)]
pub struct SumOperator<A, B> {
    a: A,
    b: B,
}

impl<A: LinearOperator, B: LinearOperator> SumOperator<A, B> {
    pub fn new(a: A, b: B) -> CtmcResult<Self> {
        let (ra, ca) = a.shape();
        let (rb, cb) = b.shape();
        if ra != rb {
            return Err(CtmcError::ShapeMismatch {
                context: "operator sum rows",
                expected: ra,
                actual: rb,
            });
        }
        if ca != cb {
            return Err(CtmcError::ShapeMismatch {
                context: "operator sum columns",
                expected: ca,
                actual: cb,
            });
        }
        Ok(Self { a, b })
    }
}

impl<A: LinearOperator, B: LinearOperator> LinearOperator for SumOperator<A, B> {
    fn shape(&self) -> (usize, usize) {
        self.a.shape()
    }
    fn apply(&self, x: ArrayView2<f64>) -> Array2<f64> {
        self.a.apply(x) + self.b.apply(x)
    }
    fn apply_transpose(&self, x: ArrayView2<f64>) -> Array2<f64> {
        self.a.apply_transpose(x) + self.b.apply_transpose(x)
    }
    fn one_norm(&self) -> f64 {
        self.a.one_norm() + self.b.one_norm()
    }
    fn inf_norm(&self) -> f64 {
        self.a.inf_norm() + self.b.inf_norm()
    }
    fn trace(&self) -> f64 {
        self.a.trace() + self.b.trace()
    }
}

/// Transpose view; swaps the two actions and the two norms.
#[derive(Debug, Clone)]
pub struct Transposed<O> {
    op: O,
}

impl<O: LinearOperator> Transposed<O> {
    pub fn new(op: O) -> Self {
        Self { op }
    }
}

impl<O: LinearOperator> LinearOperator for Transposed<O> {
    fn shape(&self) -> (usize, usize) {
        let (r, c) = self.op.shape();
        (c, r)
    }
    fn apply(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.op.apply_transpose(b)
    }
    fn apply_transpose(&self, b: ArrayView2<f64>) -> Array2<f64> {
        self.op.apply(b)
    }
    fn one_norm(&self) -> f64 {
        self.op.inf_norm()
    }
    fn inf_norm(&self) -> f64 {
        self.op.one_norm()
    }
    fn trace(&self) -> f64 {
        self.op.trace()
    }
}
