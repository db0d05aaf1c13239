//! Block 1-norm estimation (Higham & Tisseur 2000, algorithm 2.4).
//!
//! The estimator only touches the operator through `A·X` and `Aᴴ·X` on
//! `n x t` blocks, so it works on power and block-augmented operators that
//! are never densified. Probe columns are drawn from a fixed-seed generator:
//! estimating the same operator twice gives bit-identical results.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{CtmcError, CtmcResult};
use crate::operator::LinearOperator;

const PROBE_SEED: u64 = 0x5eed_0f_1ae;

#[derive(Debug, Clone)]
pub struct NormEstimate {
    /// Lower bound on `‖A‖₁`; exact when computed by the dense fallback.
    pub est: f64,
    /// Elementary vector whose image attains `est`.
    pub v: Array1<f64>,
    /// `A · v`.
    pub w: Array1<f64>,
    /// Number of block products (`A·X` or `Aᴴ·X`) taken.
    pub nmults: usize,
    /// Number of test columns redrawn to break parallelism.
    pub nresamples: usize,
}

pub fn new_rng() -> SmallRng {
    SmallRng::seed_from_u64(PROBE_SEED)
}

/// Estimate `‖A‖₁` with block width `t` and at most `itmax` iterations.
pub fn onenormest<O: LinearOperator>(a: &O, t: usize, itmax: usize) -> CtmcResult<f64> {
    Ok(onenormest_full(a, t, itmax)?.est)
}

/// Estimate with the fixed-seed generator, returning the full certificate.
pub fn onenormest_full<O: LinearOperator>(
    a: &O,
    t: usize,
    itmax: usize,
) -> CtmcResult<NormEstimate> {
    let mut rng = new_rng();
    onenormest_with_rng(a, t, itmax, &mut rng)
}

pub fn onenormest_with_rng<O: LinearOperator, R: Rng>(
    a: &O,
    t: usize,
    itmax: usize,
    rng: &mut R,
) -> CtmcResult<NormEstimate> {
    check_tuning(t, itmax)?;
    let (rows, cols) = a.shape();
    if rows != cols {
        return Err(CtmcError::NotSquare { rows, cols });
    }
    let n = cols;
    if n == 0 {
        return Ok(NormEstimate {
            est: 0.0,
            v: Array1::zeros(0),
            w: Array1::zeros(0),
            nmults: 0,
            nresamples: 0,
        });
    }
    if t >= n {
        return Ok(exact_one_norm(a));
    }
    onenormest_core(a, t, itmax, rng)
}

fn check_tuning(t: usize, itmax: usize) -> CtmcResult<()> {
    if t < 1 {
        return Err(CtmcError::InvalidParameter {
            name: "t",
            value: t.to_string(),
            reason: "block width must be at least 1",
        });
    }
    if itmax < 2 {
        return Err(CtmcError::InvalidParameter {
            name: "itmax",
            value: itmax.to_string(),
            reason: "at least two iterations are required",
        });
    }
    Ok(())
}

fn exact_one_norm<O: LinearOperator>(a: &O) -> NormEstimate {
    let n = a.shape().1;
    let dense = a.apply(Array2::eye(n).view());
    let col_sums = dense.mapv(f64::abs).sum_axis(Axis(0));
    let best = argmax(col_sums.view());
    NormEstimate {
        est: col_sums[best],
        v: elementary(n, best),
        w: dense.column(best).to_owned(),
        nmults: 1,
        nresamples: 0,
    }
}

/// Block iteration proper; requires `1 <= t < n` and `itmax >= 2`.
pub fn onenormest_core<O: LinearOperator, R: Rng>(
    a: &O,
    t: usize,
    itmax: usize,
    rng: &mut R,
) -> CtmcResult<NormEstimate> {
    check_tuning(t, itmax)?;
    let (rows, n) = a.shape();
    if rows != n {
        return Err(CtmcError::NotSquare { rows, cols: n });
    }
    if t >= n {
        return Err(CtmcError::InvalidParameter {
            name: "t",
            value: t.to_string(),
            reason: "block width must be smaller than the operator order",
        });
    }

    let mut nmults = 0usize;
    let mut nresamples = 0usize;

    let mut x = Array2::<f64>::ones((n, t));
    if t > 1 {
        for j in 1..t {
            resample_column(&mut x, j, rng);
        }
        for j in 0..t {
            while column_needs_resampling(&x, j, None) {
                resample_column(&mut x, j, rng);
                nresamples += 1;
            }
        }
    }
    x /= n as f64;

    let mut ind_hist: Vec<usize> = Vec::new();
    let mut ind: Vec<usize> = Vec::new();
    let mut est_old = 0.0f64;
    let mut s = Array2::<f64>::zeros((n, t));
    let mut ind_best = 0usize;
    let mut w = Array1::<f64>::zeros(n);
    let mut k = 1usize;
    let est;

    loop {
        let y = a.apply(x.view());
        nmults += 1;
        let mags = y.mapv(f64::abs).sum_axis(Axis(0));
        let best_j = argmax(mags.view());
        let est_k = mags[best_j];
        if est_k > est_old || k == 2 {
            if k >= 2 {
                ind_best = ind[best_j];
            }
            w = y.column(best_j).to_owned();
        }

        // (1) no improvement
        if k >= 2 && est_k <= est_old {
            est = est_old;
            break;
        }
        est_old = est_k;
        let s_old = s;
        if k > itmax {
            est = est_k;
            break;
        }
        s = y.mapv(|v| if v >= 0.0 { 1.0 } else { -1.0 });

        // (2) sign pattern repeated
        if every_column_parallel(s.view(), s_old.view()) {
            est = est_k;
            break;
        }
        if t > 1 {
            for j in 0..t {
                while column_needs_resampling(&s, j, Some(s_old.view())) {
                    resample_column(&mut s, j, rng);
                    nresamples += 1;
                }
            }
        }

        // (3)
        let z = a.apply_transpose(s.view());
        nmults += 1;
        let h: Vec<f64> = z
            .rows()
            .into_iter()
            .map(|row| row.iter().fold(0.0f64, |m, v| m.max(v.abs())))
            .collect();

        // (4) no new maximizing row
        let h_max = h.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if k >= 2 && h_max == h[ind_best] {
            est = est_k;
            break;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| h[j].total_cmp(&h[i]));
        order.truncate(t + ind_hist.len());
        ind = order;

        if t > 1 {
            // (5) every leading index already tried
            if ind[..t].iter().all(|i| ind_hist.contains(i)) {
                est = est_k;
                break;
            }
            let (fresh, seen): (Vec<usize>, Vec<usize>) =
                ind.iter().partition(|i| !ind_hist.contains(i));
            ind = fresh.into_iter().chain(seen).collect();
        }

        x = Array2::zeros((n, t));
        for j in 0..t {
            x[[ind[j], j]] = 1.0;
        }
        for &i in &ind[..t] {
            if !ind_hist.contains(&i) {
                ind_hist.push(i);
            }
        }
        k += 1;
    }

    Ok(NormEstimate {
        est,
        v: elementary(n, ind_best),
        w,
        nmults,
        nresamples,
    })
}

fn elementary(n: usize, i: usize) -> Array1<f64> {
    let mut v = Array1::zeros(n);
    v[i] = 1.0;
    v
}

fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn resample_column<R: Rng>(x: &mut Array2<f64>, j: usize, rng: &mut R) {
    for v in x.column_mut(j) {
        *v = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    }
}

/// ±1 vectors of length `n` are parallel iff `|u·v| = n`.
fn parallel(u: ArrayView1<f64>, v: ArrayView1<f64>) -> bool {
    u.dot(&v).abs() == u.len() as f64
}

fn column_needs_resampling(x: &Array2<f64>, j: usize, other: Option<ArrayView2<f64>>) -> bool {
    let col = x.column(j);
    if (0..j).any(|i| parallel(col, x.column(i))) {
        return true;
    }
    match other {
        Some(y) => y.columns().into_iter().any(|c| parallel(col, c)),
        None => false,
    }
}

fn every_column_parallel(x: ArrayView2<f64>, y: ArrayView2<f64>) -> bool {
    x.columns()
        .into_iter()
        .all(|c| y.columns().into_iter().any(|d| parallel(c, d)))
}
