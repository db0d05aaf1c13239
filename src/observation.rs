use ndarray::Array2;

use crate::error::{CtmcError, CtmcResult};
use crate::process::StateSpace;

/// Value of an unobserved cell.
pub const MISSING: i64 = -1;

/// IID site observations of single state-space axes at tree nodes.
///
/// Column `j` of `data` observes axis `variables[j]` at node `nodes[j]`.
#[derive(Debug, Clone)]
pub struct Observations {
    nodes: Vec<usize>,
    variables: Vec<usize>,
    data: Array2<i64>,
}

impl Observations {
    pub fn new(
        nodes: Vec<usize>,
        variables: Vec<usize>,
        data: Array2<i64>,
        node_count: usize,
        space: &StateSpace,
    ) -> CtmcResult<Self> {
        let invalid = |msg: String| CtmcError::InvalidObservation(msg);
        if nodes.len() != variables.len() {
            return Err(invalid(format!(
                "{} observed nodes but {} observed variables",
                nodes.len(),
                variables.len()
            )));
        }
        if data.ncols() != nodes.len() {
            return Err(invalid(format!(
                "observation matrix has {} columns, expected {}",
                data.ncols(),
                nodes.len()
            )));
        }
        for (j, (&node, &axis)) in nodes.iter().zip(&variables).enumerate() {
            if node >= node_count {
                return Err(invalid(format!(
                    "observable {j} refers to node {node} outside 0..{node_count}"
                )));
            }
            if axis >= space.ndim() {
                return Err(invalid(format!(
                    "observable {j} refers to axis {axis}, the state space has {}",
                    space.ndim()
                )));
            }
            let k = space.shape()[axis] as i64;
            if let Some((site, v)) = data
                .column(j)
                .iter()
                .enumerate()
                .find(|(_, v)| **v < MISSING || **v >= k)
            {
                return Err(invalid(format!(
                    "site {site}, observable {j}: value {v} outside -1..{k}"
                )));
            }
        }
        Ok(Self {
            nodes,
            variables,
            data,
        })
    }

    pub fn nsites(&self) -> usize {
        self.data.nrows()
    }

    pub fn nobservables(&self) -> usize {
        self.nodes.len()
    }

    pub fn data(&self) -> &Array2<i64> {
        &self.data
    }

    /// `(nstates, nsites)` support indicator at `node`.
    ///
    /// Entry `(s, site)` is 1 when flat state `s` agrees with every observed
    /// axis at the node for that site, 0 otherwise. Unobserved nodes get all
    /// ones.
    pub fn indicator_array(&self, node: usize, space: &StateSpace) -> Array2<f64> {
        let mut out = Array2::<f64>::ones((space.nstates(), self.nsites()));
        for (j, _) in self.nodes.iter().enumerate().filter(|(_, n)| **n == node) {
            let axis_values = space.axis_values(self.variables[j]);
            for (site, &observed) in self.data.column(j).iter().enumerate() {
                if observed == MISSING {
                    continue;
                }
                for (state, &v) in axis_values.iter().enumerate() {
                    if v as i64 != observed {
                        out[[state, site]] = 0.0;
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn indicator_combines_axes_and_missing_values() {
        let space = StateSpace::new(vec![2, 2]).unwrap();
        let data = array![[1, 0], [-1, 1], [-1, -1]];
        let obs = Observations::new(vec![3, 3], vec![0, 1], data, 4, &space).unwrap();
        assert_eq!(obs.nobservables(), 2);
        let ind = obs.indicator_array(3, &space);
        // flat states: 0=(0,0) 1=(0,1) 2=(1,0) 3=(1,1)
        assert_eq!(ind.column(0).to_vec(), vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(ind.column(1).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(ind.column(2).to_vec(), vec![1.0; 4]);
        assert_eq!(obs.indicator_array(0, &space), Array2::<f64>::ones((4, 3)));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let space = StateSpace::new(vec![2]).unwrap();
        let err = Observations::new(vec![0], vec![0], array![[2]], 1, &space).unwrap_err();
        assert!(matches!(err, CtmcError::InvalidObservation(_)));
        let err = Observations::new(vec![0], vec![0], array![[-2]], 1, &space).unwrap_err();
        assert!(matches!(err, CtmcError::InvalidObservation(_)));
    }
}
