use ndarray::Array1;

use crate::error::{CtmcError, CtmcResult};
use crate::observation::Observations;
use crate::process::{RateProcess, StateSpace};
use crate::tree::Tree;

const PRIOR_SUM_TOL: f64 = 1e-6;

/// Dense root distribution over flat states.
#[derive(Debug, Clone)]
pub struct RootPrior {
    distribution: Array1<f64>,
}

impl RootPrior {
    /// Scatter sparse `(state, probability)` pairs into a dense distribution.
    pub fn new(states: &[Vec<usize>], probabilities: &[f64], space: &StateSpace) -> CtmcResult<Self> {
        if states.len() != probabilities.len() {
            return Err(CtmcError::InvalidPrior(format!(
                "{} states but {} probabilities",
                states.len(),
                probabilities.len()
            )));
        }
        let mut distribution = Array1::<f64>::zeros(space.nstates());
        for (state, &p) in states.iter().zip(probabilities) {
            if !p.is_finite() || p < 0.0 {
                return Err(CtmcError::InvalidPrior(format!(
                    "probability {p} for state {state:?}"
                )));
            }
            let flat = space
                .ravel(state)
                .map_err(|e| CtmcError::InvalidPrior(e.to_string()))?;
            distribution[flat] += p;
        }
        Self::from_distribution(distribution)
    }

    pub fn from_distribution(distribution: Array1<f64>) -> CtmcResult<Self> {
        if distribution.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(CtmcError::InvalidPrior(
                "entries must be finite and nonnegative".to_string(),
            ));
        }
        let total = distribution.sum();
        if (total - 1.0).abs() > PRIOR_SUM_TOL {
            return Err(CtmcError::InvalidPrior(format!(
                "probabilities sum to {total}"
            )));
        }
        Ok(Self { distribution })
    }

    pub fn distribution(&self) -> &Array1<f64> {
        &self.distribution
    }
}

/// Everything one evaluation needs, validated together.
#[derive(Debug, Clone)]
pub struct Scene {
    space: StateSpace,
    tree: Tree,
    processes: Vec<RateProcess>,
    edge_processes: Vec<usize>,
    edge_rates: Vec<f64>,
    prior: RootPrior,
    observations: Observations,
}

impl Scene {
    pub fn new(
        space: StateSpace,
        tree: Tree,
        processes: Vec<RateProcess>,
        edge_processes: Vec<usize>,
        edge_rates: Vec<f64>,
        prior: RootPrior,
        observations: Observations,
    ) -> CtmcResult<Self> {
        let nedges = tree.edge_count();
        if edge_processes.len() != nedges {
            return Err(CtmcError::Structure(format!(
                "{} edge processes for {nedges} edges",
                edge_processes.len()
            )));
        }
        if edge_rates.len() != nedges {
            return Err(CtmcError::Structure(format!(
                "{} edge rate scaling factors for {nedges} edges",
                edge_rates.len()
            )));
        }
        if let Some((e, p)) = edge_processes
            .iter()
            .enumerate()
            .find(|(_, p)| **p >= processes.len())
        {
            return Err(CtmcError::Structure(format!(
                "edge {e} uses process {p}, only {} are defined",
                processes.len()
            )));
        }
        if let Some((e, r)) = edge_rates
            .iter()
            .enumerate()
            .find(|(_, r)| !r.is_finite() || **r < 0.0)
        {
            return Err(CtmcError::InvalidParameter {
                name: "edge rate scaling factor",
                value: format!("{r} (edge {e})"),
                reason: "must be finite and nonnegative",
            });
        }
        let n = space.nstates();
        if let Some((i, p)) = processes
            .iter()
            .enumerate()
            .find(|(_, p)| p.nstates() != n)
        {
            return Err(CtmcError::InvalidProcess {
                process: i,
                reason: format!("{} states, the state space has {n}", p.nstates()),
            });
        }
        if prior.distribution().len() != n {
            return Err(CtmcError::InvalidPrior(format!(
                "{} entries, the state space has {n}",
                prior.distribution().len()
            )));
        }
        Ok(Self {
            space,
            tree,
            processes,
            edge_processes,
            edge_rates,
            prior,
            observations,
        })
    }

    pub fn space(&self) -> &StateSpace {
        &self.space
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn processes(&self) -> &[RateProcess] {
        &self.processes
    }

    pub fn edge_process(&self, e: usize) -> usize {
        self.edge_processes[e]
    }

    pub fn edge_rate(&self, e: usize) -> f64 {
        self.edge_rates[e]
    }

    pub fn prior(&self) -> &RootPrior {
        &self.prior
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    pub fn nstates(&self) -> usize {
        self.space.nstates()
    }

    pub fn nsites(&self) -> usize {
        self.observations.nsites()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn duplicate_prior_states_accumulate() {
        let space = StateSpace::new(vec![3]).unwrap();
        let prior = RootPrior::new(&[vec![2], vec![0], vec![2]], &[0.25, 0.5, 0.25], &space).unwrap();
        assert_eq!(prior.distribution(), &array![0.5, 0.0, 0.5]);
    }

    #[test]
    fn prior_must_sum_to_one() {
        let space = StateSpace::new(vec![2]).unwrap();
        assert!(matches!(
            RootPrior::new(&[vec![0]], &[0.9], &space),
            Err(CtmcError::InvalidPrior(_))
        ));
        assert!(RootPrior::from_distribution(array![0.5, -0.5, 1.0]).is_err());
        assert!(RootPrior::from_distribution(array![0.3, 0.7]).is_ok());
    }
}
