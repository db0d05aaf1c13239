//! Matrix exponential times a block: `expm(rate·A)·B` and `expm(rate·Aᵀ)·B`.
//!
//! Three strategies share the [`ExpmAction`] trait:
//!
//! * [`PadeExpm`]: densify once, then Higham (2005) scaling and squaring per
//!   rate with a rational Padé approximant.
//! * [`EigenExpm`]: reversible generators only; a symmetric
//!   eigendecomposition is cached and each rate costs two block products.
//! * [`ActionExpm`]: Al-Mohy & Higham (2011) truncated Taylor action; the
//!   exponential itself is never formed.
//!
//! [`FrechetExpm`] exponentiates a block-augmented operator and splits the
//! result into the transition matrix and the Fréchet derivative block.

use std::sync::OnceLock;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{CtmcError, CtmcResult};
use crate::onenormest::onenormest;
use crate::operator::{DiagonalShift, LinearOperator, PowerOperator, Transposed};
use crate::utils::{all_finite, exact_inf_norm, exact_one_norm};

/// Exponential action of a fixed square operator at arbitrary rates.
pub trait ExpmAction: Send + Sync {
    fn order(&self) -> usize;

    fn one_norm(&self) -> f64;

    fn inf_norm(&self) -> f64;

    /// `expm(rate·A) · B`.
    fn expm_mul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>>;

    /// `expm(rate·Aᵀ) · B`.
    fn expm_tmul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>>;
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpmStrategy {
    #[default]
    Pade,
    Eigen,
    Action,
}

impl ExpmStrategy {
    pub fn name(self) -> &'static str {
        match self {
            ExpmStrategy::Pade => "pade",
            ExpmStrategy::Eigen => "eigen",
            ExpmStrategy::Action => "action",
        }
    }

    pub fn build<O>(self, op: O) -> CtmcResult<Box<dyn ExpmAction>>
    where
        O: DiagonalShift + 'static,
    {
        debug!(strategy = self.name(), order = op.shape().0, "building exponential");
        Ok(match self {
            ExpmStrategy::Pade => Box::new(PadeExpm::new(&op)?),
            ExpmStrategy::Eigen => Box::new(EigenExpm::new(&op)?),
            ExpmStrategy::Action => Box::new(ActionExpm::new(op)?),
        })
    }
}

fn check_rate(rate: f64) -> CtmcResult<()> {
    if !rate.is_finite() {
        return Err(CtmcError::InvalidParameter {
            name: "rate",
            value: rate.to_string(),
            reason: "must be finite",
        });
    }
    Ok(())
}

fn check_block(order: usize, b: ArrayView2<f64>) -> CtmcResult<()> {
    if b.nrows() != order {
        return Err(CtmcError::ShapeMismatch {
            context: "exponential action block",
            expected: order,
            actual: b.nrows(),
        });
    }
    Ok(())
}

fn finite_or_fail(out: Array2<f64>, context: &'static str) -> CtmcResult<Array2<f64>> {
    if all_finite(out.view()) {
        Ok(out)
    } else {
        Err(CtmcError::NumericalFailure { context })
    }
}

fn square_order<O: LinearOperator>(op: &O) -> CtmcResult<usize> {
    let (rows, cols) = op.shape();
    if rows != cols {
        return Err(CtmcError::NotSquare { rows, cols });
    }
    Ok(rows)
}

// ---- Padé scaling and squaring ----

const PADE_THETA: [(usize, f64); 4] = [
    (3, 1.495585217958292e-2),
    (5, 2.539398330063230e-1),
    (7, 9.504178996162932e-1),
    (9, 2.097847961257068),
];
const THETA_13: f64 = 5.371920351148152;

const PADE_3: [f64; 4] = [120.0, 60.0, 12.0, 1.0];
const PADE_5: [f64; 6] = [30240.0, 15120.0, 3360.0, 420.0, 30.0, 1.0];
const PADE_7: [f64; 8] = [
    17297280.0, 8648640.0, 1995840.0, 277200.0, 25200.0, 1512.0, 56.0, 1.0,
];
const PADE_9: [f64; 10] = [
    17643225600.0,
    8821612800.0,
    2075673600.0,
    302702400.0,
    30270240.0,
    2162160.0,
    110880.0,
    3960.0,
    90.0,
    1.0,
];
const PADE_13: [f64; 14] = [
    64764752532480000.0,
    32382376266240000.0,
    7771770303897600.0,
    1187353796428800.0,
    129060195264000.0,
    10559470521600.0,
    670442572800.0,
    33522128640.0,
    1323241920.0,
    40840800.0,
    960960.0,
    16380.0,
    182.0,
    1.0,
];

fn pade_coefficients(m: usize) -> &'static [f64] {
    match m {
        3 => &PADE_3,
        5 => &PADE_5,
        7 => &PADE_7,
        _ => &PADE_9,
    }
}

fn to_nalgebra(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

fn from_nalgebra(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// `(V - U)⁻¹ (V + U)`.
fn pade_solve(u: &Array2<f64>, v: &Array2<f64>) -> CtmcResult<Array2<f64>> {
    let lhs = to_nalgebra(&(v - u));
    let rhs = to_nalgebra(&(v + u));
    let x = lhs.lu().solve(&rhs).ok_or(CtmcError::NumericalFailure {
        context: "Padé denominator solve",
    })?;
    Ok(from_nalgebra(&x))
}

/// Low-order approximant `r_m(A)` for `m` in 3, 5, 7, 9.
fn pade_low(a: &Array2<f64>, a2: &Array2<f64>, m: usize) -> CtmcResult<Array2<f64>> {
    let b = pade_coefficients(m);
    let n = a.nrows();
    let mut power = Array2::<f64>::eye(n);
    let mut u_inner = Array2::<f64>::zeros((n, n));
    let mut v = Array2::<f64>::zeros((n, n));
    for j in 0..=(m / 2) {
        if j > 0 {
            power = power.dot(a2);
        }
        v.scaled_add(b[2 * j], &power);
        u_inner.scaled_add(b[2 * j + 1], &power);
    }
    let u = a.dot(&u_inner);
    pade_solve(&u, &v)
}

fn pade_13(a: &Array2<f64>) -> CtmcResult<Array2<f64>> {
    let b = &PADE_13;
    let n = a.nrows();
    let ident = Array2::<f64>::eye(n);
    let a2 = a.dot(a);
    let a4 = a2.dot(&a2);
    let a6 = a2.dot(&a4);
    let u_high = &a6 * b[13] + &a4 * b[11] + &a2 * b[9];
    let u_low = &a6 * b[7] + &a4 * b[5] + &a2 * b[3] + &ident * b[1];
    let u = a.dot(&(a6.dot(&u_high) + u_low));
    let v_high = &a6 * b[12] + &a4 * b[10] + &a2 * b[8];
    let v = a6.dot(&v_high) + &a6 * b[6] + &a4 * b[4] + &a2 * b[2] + &ident * b[0];
    pade_solve(&u, &v)
}

/// Dense `expm(A)` by scaling and squaring.
pub fn pade_expm(a: &Array2<f64>) -> CtmcResult<Array2<f64>> {
    let norm = exact_one_norm(a.view());
    if !norm.is_finite() {
        return Err(CtmcError::NumericalFailure {
            context: "Padé input norm",
        });
    }
    if a.nrows() == 0 {
        return Ok(a.clone());
    }
    for &(m, theta) in &PADE_THETA {
        if norm <= theta {
            let a2 = a.dot(a);
            return pade_low(a, &a2, m);
        }
    }
    let s = (norm / THETA_13).log2().ceil().max(0.0) as i32;
    let scaled = a / 2f64.powi(s);
    let mut r = pade_13(&scaled)?;
    for _ in 0..s {
        r = r.dot(&r);
    }
    Ok(r)
}

#[derive(Debug, Clone)]
pub struct PadeExpm {
    a: Array2<f64>,
    one_norm: f64,
    inf_norm: f64,
}

impl PadeExpm {
    pub fn new<O: LinearOperator>(op: &O) -> CtmcResult<Self> {
        square_order(op)?;
        let a = op.to_dense();
        Ok(Self {
            one_norm: exact_one_norm(a.view()),
            inf_norm: exact_inf_norm(a.view()),
            a,
        })
    }

    /// Dense `expm(rate·A)`.
    pub fn expm(&self, rate: f64) -> CtmcResult<Array2<f64>> {
        check_rate(rate)?;
        let p = pade_expm(&(&self.a * rate))?;
        finite_or_fail(p, "Padé exponential")
    }
}

impl ExpmAction for PadeExpm {
    fn order(&self) -> usize {
        self.a.nrows()
    }
    fn one_norm(&self) -> f64 {
        self.one_norm
    }
    fn inf_norm(&self) -> f64 {
        self.inf_norm
    }
    fn expm_mul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        check_block(self.order(), b)?;
        if rate == 0.0 {
            return Ok(b.to_owned());
        }
        let p = self.expm(rate)?;
        finite_or_fail(p.dot(&b), "Padé action")
    }
    fn expm_tmul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        check_block(self.order(), b)?;
        if rate == 0.0 {
            return Ok(b.to_owned());
        }
        let p = self.expm(rate)?;
        finite_or_fail(p.t().dot(&b), "Padé transpose action")
    }
}

// ---- Symmetrized eigendecomposition ----

const DETAILED_BALANCE_TOL: f64 = 1e-8;

/// `Q = U diag(λ) U⁻¹` for a reversible generator `Q`.
#[derive(Debug, Clone)]
pub struct EigenExpm {
    eigenvalues: Array1<f64>,
    u: Array2<f64>,
    u_inv: Array2<f64>,
    one_norm: f64,
    inf_norm: f64,
}

impl EigenExpm {
    pub fn new<O: LinearOperator>(op: &O) -> CtmcResult<Self> {
        let n = square_order(op)?;
        let q = op.to_dense();
        let one_norm = exact_one_norm(q.view());
        let inf_norm = exact_inf_norm(q.view());
        if n == 0 {
            return Ok(Self {
                eigenvalues: Array1::zeros(0),
                u: q.clone(),
                u_inv: q,
                one_norm,
                inf_norm,
            });
        }
        let pi = stationary_distribution(&q)?;
        check_detailed_balance(&q, &pi)?;

        let sqrt_pi = pi.mapv(f64::sqrt);
        let sym = DMatrix::from_fn(n, n, |i, j| {
            let a = sqrt_pi[i] * q[[i, j]] / sqrt_pi[j];
            let b = sqrt_pi[j] * q[[j, i]] / sqrt_pi[i];
            0.5 * (a + b)
        });
        let eigen = SymmetricEigen::new(sym);
        let vecs = &eigen.eigenvectors;
        let eigenvalues = Array1::from_iter(eigen.eigenvalues.iter().copied());
        let u = Array2::from_shape_fn((n, n), |(i, j)| vecs[(i, j)] / sqrt_pi[i]);
        let u_inv = Array2::from_shape_fn((n, n), |(i, j)| vecs[(j, i)] * sqrt_pi[j]);
        debug!(order = n, "reversible generator diagonalized");
        Ok(Self {
            eigenvalues,
            u,
            u_inv,
            one_norm,
            inf_norm,
        })
    }

    fn exp_diag(&self, rate: f64) -> Array2<f64> {
        self.eigenvalues
            .mapv(|l| (rate * l).exp())
            .insert_axis(Axis(1))
    }
}

fn unavailable(reason: impl Into<String>) -> CtmcError {
    CtmcError::StrategyUnavailable {
        strategy: "eigen",
        reason: reason.into(),
    }
}

/// Solve `πᵀQ = 0`, `Σπ = 1` by replacing one balance equation.
fn stationary_distribution(q: &Array2<f64>) -> CtmcResult<Array1<f64>> {
    let n = q.nrows();
    let system = DMatrix::from_fn(n, n, |i, j| if i == n - 1 { 1.0 } else { q[[j, i]] });
    let mut rhs = nalgebra::DVector::zeros(n);
    rhs[n - 1] = 1.0;
    let pi = system
        .lu()
        .solve(&rhs)
        .ok_or_else(|| unavailable("generator has no unique stationary distribution"))?;
    if pi.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(unavailable(
            "stationary distribution is not strictly positive",
        ));
    }
    Ok(Array1::from_iter(pi.iter().copied()))
}

fn check_detailed_balance(q: &Array2<f64>, pi: &Array1<f64>) -> CtmcResult<()> {
    let n = q.nrows();
    let scale = (0..n)
        .map(|i| pi[i] * q[[i, i]].abs())
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);
    for i in 0..n {
        for j in (i + 1)..n {
            let forward = pi[i] * q[[i, j]];
            let backward = pi[j] * q[[j, i]];
            if (forward - backward).abs() > DETAILED_BALANCE_TOL * scale {
                return Err(unavailable(format!(
                    "detailed balance fails between states {i} and {j}"
                )));
            }
        }
    }
    Ok(())
}

impl ExpmAction for EigenExpm {
    fn order(&self) -> usize {
        self.eigenvalues.len()
    }
    fn one_norm(&self) -> f64 {
        self.one_norm
    }
    fn inf_norm(&self) -> f64 {
        self.inf_norm
    }
    fn expm_mul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        check_block(self.order(), b)?;
        check_rate(rate)?;
        if rate == 0.0 {
            return Ok(b.to_owned());
        }
        let inner = self.u_inv.dot(&b) * &self.exp_diag(rate);
        finite_or_fail(self.u.dot(&inner), "eigen action")
    }
    fn expm_tmul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        check_block(self.order(), b)?;
        check_rate(rate)?;
        if rate == 0.0 {
            return Ok(b.to_owned());
        }
        let inner = self.u.t().dot(&b) * &self.exp_diag(rate);
        finite_or_fail(self.u_inv.t().dot(&inner), "eigen transpose action")
    }
}

// ---- Truncated Taylor action ----

const M_MAX: usize = 55;
const THETA_M_MAX: f64 = 9.9;
const P_MAX: usize = 8;
const ELL: usize = 2;
const NORMEST_ITMAX: usize = 5;
const TAYLOR_TOL: f64 = 1.1102230246251565e-16; // 2^-53
/// Above this many Taylor steps the dense Padé path is cheaper.
const MAX_TAYLOR_STEPS: usize = 4096;

/// Backward-error bounds θ_m for the degree-m Taylor truncation.
const TAYLOR_THETA: [(usize, f64); 35] = [
    (1, 2.29e-16),
    (2, 2.58e-8),
    (3, 1.39e-5),
    (4, 3.40e-4),
    (5, 2.40e-3),
    (6, 9.07e-3),
    (7, 2.38e-2),
    (8, 5.00e-2),
    (9, 8.96e-2),
    (10, 1.44e-1),
    (11, 2.14e-1),
    (12, 3.00e-1),
    (13, 4.00e-1),
    (14, 5.14e-1),
    (15, 6.41e-1),
    (16, 7.81e-1),
    (17, 9.31e-1),
    (18, 1.09),
    (19, 1.26),
    (20, 1.44),
    (21, 1.62),
    (22, 1.82),
    (23, 2.01),
    (24, 2.22),
    (25, 2.43),
    (26, 2.64),
    (27, 2.86),
    (28, 3.08),
    (29, 3.31),
    (30, 3.54),
    (35, 4.7),
    (40, 6.0),
    (45, 7.2),
    (50, 8.5),
    (55, 9.9),
];

fn taylor_theta(m: usize) -> Option<f64> {
    TAYLOR_THETA
        .iter()
        .find(|(k, _)| *k == m)
        .map(|(_, theta)| *theta)
}

/// Lazily estimated `‖A^p‖₁^(1/p)` for `p` in `2..=P_MAX + 1`.
#[derive(Debug, Default)]
struct PowerNormCache {
    d: [OnceLock<f64>; P_MAX + 2],
}

impl PowerNormCache {
    fn get_or_estimate<O: LinearOperator>(&self, op: &O, p: usize) -> CtmcResult<f64> {
        if let Some(v) = self.d[p].get() {
            return Ok(*v);
        }
        let power = PowerOperator::new(op, p as u32)?;
        let est = onenormest(&power, ELL, NORMEST_ITMAX)?;
        let v = est.powf(1.0 / p as f64);
        trace!(p, d = v, "power norm estimated");
        Ok(*self.d[p].get_or_init(|| v))
    }
}

/// Al-Mohy & Higham truncated Taylor action with trace shift.
///
/// Rates that would need more than `MAX_TAYLOR_STEPS` steps are delegated to
/// a lazily built [`PadeExpm`] of the same operator.
#[derive(Debug)]
pub struct ActionExpm<O: DiagonalShift> {
    op: O,
    shifted: O,
    mu: f64,
    shifted_one_norm: f64,
    shifted_inf_norm: f64,
    forward_norms: PowerNormCache,
    transpose_norms: PowerNormCache,
    fallback: OnceLock<PadeExpm>,
}

impl<O: DiagonalShift> ActionExpm<O> {
    pub fn new(op: O) -> CtmcResult<Self> {
        let n = square_order(&op)?;
        let mu = if n == 0 { 0.0 } else { op.trace() / n as f64 };
        let shifted = op.shifted(mu);
        Ok(Self {
            shifted_one_norm: shifted.one_norm(),
            shifted_inf_norm: shifted.inf_norm(),
            op,
            shifted,
            mu,
            forward_norms: PowerNormCache::default(),
            transpose_norms: PowerNormCache::default(),
            fallback: OnceLock::new(),
        })
    }

    fn pade_fallback(&self, rate: f64, steps: usize) -> CtmcResult<&PadeExpm> {
        warn!(
            rate,
            steps,
            max_steps = MAX_TAYLOR_STEPS,
            "Taylor action too long, using Padé exponential"
        );
        if let Some(pade) = self.fallback.get() {
            return Ok(pade);
        }
        let pade = PadeExpm::new(&self.op)?;
        Ok(self.fallback.get_or_init(|| pade))
    }

    /// Choose the Taylor degree `m*` and the number of steps `s`.
    fn parameters<A: LinearOperator>(
        &self,
        op: &A,
        one_norm: f64,
        cache: &PowerNormCache,
        rate: f64,
        n0: usize,
    ) -> CtmcResult<(usize, usize)> {
        let scale = rate.abs();
        let norm = scale * one_norm;
        if norm == 0.0 {
            return Ok((0, 1));
        }
        let mut best: Option<(usize, usize)> = None;
        let mut consider = |m: usize, s: usize| match best {
            Some((bm, bs)) if m.saturating_mul(s) >= bm.saturating_mul(bs) => {}
            _ => best = Some((m, s)),
        };

        let bound = (2 * ELL * P_MAX * (P_MAX + 3)) as f64 * THETA_M_MAX / (n0 * M_MAX) as f64;
        if norm <= bound {
            for &(m, theta) in &TAYLOR_THETA {
                consider(m, (norm / theta).ceil() as usize);
            }
        } else {
            for p in 2..=P_MAX {
                let dp = cache.get_or_estimate(op, p)? * scale;
                let dp1 = cache.get_or_estimate(op, p + 1)? * scale;
                let alpha = dp.max(dp1);
                for m in (p * (p - 1) - 1)..=M_MAX {
                    if let Some(theta) = taylor_theta(m) {
                        consider(m, (alpha / theta).ceil() as usize);
                    }
                }
            }
        }
        let (m, s) = best.unwrap_or((M_MAX, 1));
        Ok((m, s.max(1)))
    }

    fn taylor<A: LinearOperator>(
        op: &A,
        b: ArrayView2<f64>,
        rate: f64,
        mu: f64,
        m_star: usize,
        s: usize,
    ) -> Array2<f64> {
        let mut f = b.to_owned();
        let mut b = b.to_owned();
        let eta = (rate * mu / s as f64).exp();
        for _ in 0..s {
            let mut c1 = exact_inf_norm(b.view());
            for j in 0..m_star {
                let coeff = rate / (s * (j + 1)) as f64;
                b = op.apply(b.view()) * coeff;
                let c2 = exact_inf_norm(b.view());
                f += &b;
                if c1 + c2 <= TAYLOR_TOL * exact_inf_norm(f.view()) {
                    break;
                }
                c1 = c2;
            }
            f *= eta;
            b = f.clone();
        }
        f
    }
}

impl<O: DiagonalShift> ExpmAction for ActionExpm<O> {
    fn order(&self) -> usize {
        self.op.shape().0
    }
    fn one_norm(&self) -> f64 {
        self.op.one_norm()
    }
    fn inf_norm(&self) -> f64 {
        self.op.inf_norm()
    }
    fn expm_mul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        check_block(self.order(), b)?;
        check_rate(rate)?;
        if rate == 0.0 {
            return Ok(b.to_owned());
        }
        let (m, s) = self.parameters(
            &self.shifted,
            self.shifted_one_norm,
            &self.forward_norms,
            rate,
            b.ncols().max(1),
        )?;
        trace!(rate, m, s, "taylor action parameters");
        if s > MAX_TAYLOR_STEPS {
            return self.pade_fallback(rate, s)?.expm_mul(rate, b);
        }
        let out = Self::taylor(&self.shifted, b, rate, self.mu, m, s);
        finite_or_fail(out, "Taylor action")
    }
    fn expm_tmul(&self, rate: f64, b: ArrayView2<f64>) -> CtmcResult<Array2<f64>> {
        check_block(self.order(), b)?;
        check_rate(rate)?;
        if rate == 0.0 {
            return Ok(b.to_owned());
        }
        let transposed = Transposed::new(&self.shifted);
        let (m, s) = self.parameters(
            &transposed,
            self.shifted_inf_norm,
            &self.transpose_norms,
            rate,
            b.ncols().max(1),
        )?;
        trace!(rate, m, s, "taylor transpose action parameters");
        if s > MAX_TAYLOR_STEPS {
            return self.pade_fallback(rate, s)?.expm_tmul(rate, b);
        }
        let out = Self::taylor(&transposed, b, rate, self.mu, m, s);
        finite_or_fail(out, "Taylor transpose action")
    }
}

// ---- Fréchet pair ----

/// Transition matrix and Fréchet derivative block from an augmented operator.
///
/// The wrapped operator is `M = [[Q, E], [0, Q]]` of order `2n`. Applying
/// `expm(rate·M)` to `[[0], [I]]` yields `[[K], [P]]` with `P = expm(rate·Q)`
/// and `K = ∫₀^rate expm(u·Q) E expm((rate-u)·Q) du`.
pub struct FrechetExpm {
    inner: Box<dyn ExpmAction>,
    n: usize,
}

impl std::fmt::Debug for FrechetExpm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrechetExpm").field("n", &self.n).finish()
    }
}

impl FrechetExpm {
    /// The augmented block is never reversible; `Eigen` uses the Padé path.
    pub fn new<O>(block: O, strategy: ExpmStrategy) -> CtmcResult<Self>
    where
        O: DiagonalShift + 'static,
    {
        let order = square_order(&block)?;
        if order % 2 != 0 {
            return Err(CtmcError::InvalidParameter {
                name: "augmented order",
                value: order.to_string(),
                reason: "block-augmented operators have even order",
            });
        }
        let strategy = match strategy {
            ExpmStrategy::Eigen => ExpmStrategy::Pade,
            other => other,
        };
        Ok(Self {
            inner: strategy.build(block)?,
            n: order / 2,
        })
    }

    pub fn order(&self) -> usize {
        self.n
    }

    /// `(P, K)` at the given rate; `rate == 0` gives `(I, 0)`.
    pub fn get_expm_and_frechet(&self, rate: f64) -> CtmcResult<(Array2<f64>, Array2<f64>)> {
        let n = self.n;
        if rate == 0.0 {
            return Ok((Array2::eye(n), Array2::zeros((n, n))));
        }
        let mut basis = Array2::<f64>::zeros((2 * n, n));
        basis.slice_mut(s![n.., ..]).assign(&Array2::eye(n));
        let out = self.inner.expm_mul(rate, basis.view())?;
        let k = out.slice(s![..n, ..]).to_owned();
        let p = out.slice(s![n.., ..]).to_owned();
        Ok((p, k))
    }
}
