use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{CtmcError, CtmcResult};
use crate::operator::{RdCOperator, RdOperator, RdcOperator};
use crate::sparse::CsrMatrix;

/// Product state space over integer axes, raveled row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSpace {
    shape: Vec<usize>,
    strides: Vec<usize>,
    nstates: usize,
}

impl StateSpace {
    pub fn new(shape: Vec<usize>) -> CtmcResult<Self> {
        if shape.is_empty() {
            return Err(CtmcError::InvalidParameter {
                name: "state_space_shape",
                value: "[]".to_string(),
                reason: "at least one axis is required",
            });
        }
        if let Some(k) = shape.iter().find(|k| **k == 0) {
            return Err(CtmcError::InvalidParameter {
                name: "state_space_shape",
                value: k.to_string(),
                reason: "every axis needs at least one state",
            });
        }
        let mut strides = vec![1usize; shape.len()];
        for axis in (0..shape.len() - 1).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }
        let nstates = shape.iter().product();
        Ok(Self {
            shape,
            strides,
            nstates,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn nstates(&self) -> usize {
        self.nstates
    }

    /// Flat index of a multi-index; the last axis varies fastest.
    pub fn ravel(&self, state: &[usize]) -> CtmcResult<usize> {
        if state.len() != self.shape.len() {
            return Err(CtmcError::ShapeMismatch {
                context: "multi-index length",
                expected: self.shape.len(),
                actual: state.len(),
            });
        }
        let mut flat = 0;
        for (axis, (&v, &k)) in state.iter().zip(&self.shape).enumerate() {
            if v >= k {
                return Err(CtmcError::InvalidParameter {
                    name: "state",
                    value: format!("{state:?}"),
                    reason: "index exceeds the axis size",
                });
            }
            flat += v * self.strides[axis];
        }
        Ok(flat)
    }

    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        self.strides
            .iter()
            .map(|&stride| {
                let v = flat / stride;
                flat %= stride;
                v
            })
            .collect()
    }

    /// Value on `axis` of every flat state, in flat order.
    pub fn axis_values(&self, axis: usize) -> Vec<usize> {
        let (stride, k) = (self.strides[axis], self.shape[axis]);
        (0..self.nstates).map(|s| (s / stride) % k).collect()
    }
}

/// Sparse transition list of one rate process, as read from a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub row_states: Vec<Vec<usize>>,
    pub column_states: Vec<Vec<usize>>,
    pub transition_rates: Vec<f64>,
    /// Optional per-transition weights used when a transition request names
    /// no weights of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Vec<f64>>,
}

/// Validated rate process: off-diagonal rates `R` and exit rates `R·1`.
#[derive(Debug, Clone)]
pub struct RateProcess {
    rates: CsrMatrix,
    exit_rates: Array1<f64>,
    default_coupling: CsrMatrix,
}

impl RateProcess {
    pub fn new(index: usize, def: &ProcessDefinition, space: &StateSpace) -> CtmcResult<Self> {
        let invalid = |reason: String| CtmcError::InvalidProcess {
            process: index,
            reason,
        };
        let m = def.transition_rates.len();
        if def.row_states.len() != m || def.column_states.len() != m {
            return Err(invalid(format!(
                "{} row states, {} column states and {} rates",
                def.row_states.len(),
                def.column_states.len(),
                m
            )));
        }

        let mut rows = Vec::with_capacity(m);
        let mut cols = Vec::with_capacity(m);
        for (k, ((r, c), &rate)) in def
            .row_states
            .iter()
            .zip(&def.column_states)
            .zip(&def.transition_rates)
            .enumerate()
        {
            if !rate.is_finite() || rate < 0.0 {
                return Err(invalid(format!("transition {k} has rate {rate}")));
            }
            let i = space
                .ravel(r)
                .map_err(|e| invalid(format!("transition {k} row state: {e}")))?;
            let j = space
                .ravel(c)
                .map_err(|e| invalid(format!("transition {k} column state: {e}")))?;
            if i == j {
                return Err(invalid(format!("transition {k} is a self-transition")));
            }
            rows.push(i);
            cols.push(j);
        }

        let n = space.nstates();
        let rates = CsrMatrix::from_triplets(n, n, &rows, &cols, &def.transition_rates)
            .map_err(|e| invalid(e.to_string()))?;
        let exit_rates = rates.row_sums();

        let default_coupling = match &def.expect {
            None => rates.clone(),
            Some(weights) => {
                if weights.len() != m {
                    return Err(invalid(format!(
                        "{} expectation weights for {m} transitions",
                        weights.len()
                    )));
                }
                if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
                    return Err(invalid(format!("expectation weight {w} is not finite")));
                }
                let weighted: Vec<f64> = def
                    .transition_rates
                    .iter()
                    .zip(weights)
                    .map(|(r, w)| r * w)
                    .collect();
                CsrMatrix::from_triplets(n, n, &rows, &cols, &weighted)
                    .map_err(|e| invalid(e.to_string()))?
            }
        };

        Ok(Self {
            rates,
            exit_rates,
            default_coupling,
        })
    }

    pub fn nstates(&self) -> usize {
        self.exit_rates.len()
    }

    pub fn rates(&self) -> &CsrMatrix {
        &self.rates
    }

    /// The generator `Q = R - diag(R·1)`.
    pub fn rate_operator(&self) -> CtmcResult<RdOperator> {
        RdOperator::new(self.rates.clone(), -&self.exit_rates)
    }

    /// `[[Q, diag(c)], [0, Q]]` for a per-state dwell weight `c`.
    pub fn dwell_operator(&self, weights: Array1<f64>) -> CtmcResult<RdcOperator> {
        RdcOperator::new(self.rate_operator()?, weights)
    }

    /// `[[Q, R ⊙ W], [0, Q]]` for sparse per-transition weights `W`.
    ///
    /// Without `W` the coupling uses the process's own expectation weights,
    /// or counts every transition once when it has none.
    pub fn transition_operator(&self, weights: Option<&CsrMatrix>) -> CtmcResult<RdCOperator> {
        let Some(weights) = weights else {
            return RdCOperator::new(self.rate_operator()?, self.default_coupling.clone());
        };
        let n = self.nstates();
        if weights.shape() != (n, n) {
            return Err(CtmcError::ShapeMismatch {
                context: "transition weights",
                expected: n,
                actual: weights.shape().0,
            });
        }
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for (i, j, rate) in self.rates.iter() {
            let w = weights.get(i, j);
            if w != 0.0 {
                rows.push(i);
                cols.push(j);
                vals.push(rate * w);
            }
        }
        let coupling = CsrMatrix::from_triplets(n, n, &rows, &cols, &vals)?;
        RdCOperator::new(self.rate_operator()?, coupling)
    }

    pub fn dense_generator(&self) -> Array2<f64> {
        let mut q = self.rates.to_dense();
        for (i, e) in self.exit_rates.iter().enumerate() {
            q[[i, i]] -= e;
        }
        q
    }
}
