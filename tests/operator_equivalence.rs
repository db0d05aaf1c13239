mod common;

use approx::assert_abs_diff_eq;
use common::approx_eq_arrays;
use ndarray::{Array1, Array2, array, s};

use ctmctree_rs::CtmcError;
use ctmctree_rs::operator::{
    DenseOperator, IdentityOperator, LinearOperator, MatrixOperator, PowerOperator, RdCOperator,
    RdOperator, RdcOperator, ScaledOperator, SumOperator, Transposed,
};
use ctmctree_rs::sparse::CsrMatrix;

fn dense_norms(a: &Array2<f64>) -> (f64, f64) {
    let abs = a.mapv(f64::abs);
    let one = abs.sum_axis(ndarray::Axis(0)).fold(0.0f64, |m, v| m.max(*v));
    let inf = abs.sum_axis(ndarray::Axis(1)).fold(0.0f64, |m, v| m.max(*v));
    (one, inf)
}

fn sample_block(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| ((i * 7 + j * 3) % 5) as f64 - 1.5)
}

/// `dot`, `tdot`, `hdot` and both norms agree with the densified operator.
fn check_against_dense<O: LinearOperator>(op: &O, dense: &Array2<f64>) {
    let (rows, cols) = op.shape();
    assert_eq!(dense.dim(), (rows, cols));
    approx_eq_arrays(&op.to_dense(), dense, 1e-12);

    let b = sample_block(cols, 3);
    approx_eq_arrays(&op.dot(b.view()).unwrap(), &dense.dot(&b), 1e-12);
    let c = sample_block(rows, 2);
    approx_eq_arrays(&op.tdot(c.view()).unwrap(), &dense.t().dot(&c), 1e-12);
    approx_eq_arrays(&op.hdot(c.view()).unwrap(), &dense.t().dot(&c), 1e-12);

    let (one, inf) = dense_norms(dense);
    assert_abs_diff_eq!(op.one_norm(), one, epsilon = 1e-12);
    assert_abs_diff_eq!(op.inf_norm(), inf, epsilon = 1e-12);
    assert_abs_diff_eq!(op.trace(), dense.diag().sum(), epsilon = 1e-12);
}

fn sample_rd() -> (RdOperator, Array2<f64>) {
    // R carries one diagonal entry to exercise the combined diagonal
    let r_dense = array![[0.5, 1.0, 0.0], [2.0, 0.0, 0.25], [0.0, 3.0, 0.0]];
    let d = array![-1.5, -2.25, -7.0];
    let r = CsrMatrix::from_dense(r_dense.view());
    let rd = RdOperator::new(r, d.clone()).unwrap();
    let mut dense = r_dense;
    for i in 0..3 {
        dense[[i, i]] += d[i];
    }
    (rd, dense)
}

fn block(q: &Array2<f64>, e: &Array2<f64>) -> Array2<f64> {
    let n = q.nrows();
    let mut m = Array2::zeros((2 * n, 2 * n));
    m.slice_mut(s![..n, ..n]).assign(q);
    m.slice_mut(s![..n, n..]).assign(e);
    m.slice_mut(s![n.., n..]).assign(q);
    m
}

#[test]
fn rd_operator_matches_dense() {
    let (rd, dense) = sample_rd();
    check_against_dense(&rd, &dense);
    check_against_dense(&rd.t(), &dense.t().to_owned());
}

#[test]
fn rdc_operator_matches_dense_block() {
    let (rd, q) = sample_rd();
    let c = array![1.0, -0.5, 2.0];
    let op = RdcOperator::new(rd, c.clone()).unwrap();
    let dense = block(&q, &Array2::from_diag(&c));
    check_against_dense(&op, &dense);
    check_against_dense(&Transposed::new(&op), &dense.t().to_owned());
}

#[test]
fn rdcc_operator_matches_dense_block() {
    let (rd, q) = sample_rd();
    let c_dense = array![[0.0, 0.5, 0.0], [1.0, 0.0, 0.0], [0.0, -2.0, 0.0]];
    let c = CsrMatrix::from_dense(c_dense.view());
    let op = RdCOperator::new(rd, c).unwrap();
    let dense = block(&q, &c_dense);
    check_against_dense(&op, &dense);
    check_against_dense(&op.h(), &dense.t().to_owned());
}

#[test]
fn compositions_apply_like_dense_products() {
    let (rd, q) = sample_rd();
    let q3 = q.dot(&q).dot(&q);
    let power = PowerOperator::new(&rd, 3).unwrap();
    approx_eq_arrays(&power.to_dense(), &q3, 1e-10);
    approx_eq_arrays(
        &power.tdot(Array2::eye(3).view()).unwrap(),
        &q3.t().to_owned(),
        1e-10,
    );
    let (one, inf) = dense_norms(&q3);
    assert!(power.one_norm() >= one - 1e-12);
    assert!(power.inf_norm() >= inf - 1e-12);

    let scaled = ScaledOperator::new(&rd, -2.0);
    check_against_dense(&scaled, &(&q * -2.0));

    let sum = SumOperator::new(&rd, IdentityOperator::new(3)).unwrap();
    let expected = &q + &Array2::<f64>::eye(3);
    approx_eq_arrays(&sum.to_dense(), &expected, 1e-12);
    assert!(sum.one_norm() >= dense_norms(&expected).0 - 1e-12);

    let matrix = MatrixOperator::new(CsrMatrix::from_dense(q.view()));
    check_against_dense(&matrix, &q);
    check_against_dense(&DenseOperator::new(q.clone()), &q);
}

#[test]
fn shifted_rd_moves_only_the_diagonal() {
    let (rd, q) = sample_rd();
    let shifted = rd.shifted(0.75);
    let expected = &q - &(Array2::<f64>::eye(3) * 0.75);
    check_against_dense(&shifted, &expected);
}

#[test]
fn shape_errors() {
    let (rd, _) = sample_rd();
    let err = rd.dot(Array2::zeros((2, 1)).view()).unwrap_err();
    assert!(matches!(err, CtmcError::ShapeMismatch { expected: 3, actual: 2, .. }));
    assert!(rd.tdot(Array2::zeros((4, 1)).view()).is_err());

    let rect = DenseOperator::new(Array2::zeros((2, 3)));
    assert!(matches!(
        PowerOperator::new(rect, 2),
        Err(CtmcError::NotSquare { rows: 2, cols: 3 })
    ));
    assert!(SumOperator::new(IdentityOperator::new(2), IdentityOperator::new(3)).is_err());
    assert!(RdcOperator::new(rd.clone(), Array1::zeros(2)).is_err());
    assert!(RdOperator::new(CsrMatrix::from_dense(Array2::zeros((3, 3)).view()), Array1::zeros(2)).is_err());
}
