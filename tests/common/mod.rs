#![allow(dead_code)]

use ndarray::{Array1, Array2, array};

use ctmctree_rs::Scene;
use ctmctree_rs::observation::Observations;
use ctmctree_rs::process::{ProcessDefinition, RateProcess, StateSpace};
use ctmctree_rs::scene::RootPrior;
use ctmctree_rs::tree::Tree;

pub fn approx_eq(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "values differ: a={a}, b={b}, |a-b|={}, eps={eps}",
        (a - b).abs()
    );
}

pub fn approx_eq_arrays(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
    assert_eq!(a.dim(), b.dim(), "shape mismatch");
    for ((idx, x), y) in a.indexed_iter().zip(b.iter()) {
        assert!(
            (x - y).abs() <= eps,
            "entry {idx:?} differs: {x} vs {y} (eps={eps})"
        );
    }
}

/// Brute-force `expm(A)`: Taylor series of `A / 2^s` then `s` squarings.
pub fn taylor_expm(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let norm = a
        .columns()
        .into_iter()
        .map(|c| c.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let mut s = 0;
    while norm / 2f64.powi(s) > 0.25 {
        s += 1;
    }
    let scaled = a / 2f64.powi(s);
    let mut out = Array2::<f64>::eye(n);
    let mut term = Array2::<f64>::eye(n);
    for k in 1..40 {
        term = term.dot(&scaled) / k as f64;
        out += &term;
    }
    for _ in 0..s {
        out = out.dot(&out);
    }
    out
}

/// States as one-axis multi-indices.
pub fn states(ids: &[usize]) -> Vec<Vec<usize>> {
    ids.iter().map(|&i| vec![i]).collect()
}

/// Dense off-diagonal rates to a process definition on a single axis.
pub fn definition_from_dense(rates: &Array2<f64>) -> ProcessDefinition {
    let mut row_states = Vec::new();
    let mut column_states = Vec::new();
    let mut transition_rates = Vec::new();
    for ((i, j), &r) in rates.indexed_iter() {
        if i != j && r != 0.0 {
            row_states.push(vec![i]);
            column_states.push(vec![j]);
            transition_rates.push(r);
        }
    }
    ProcessDefinition {
        row_states,
        column_states,
        transition_rates,
        expect: None,
    }
}

/// Generator from off-diagonal rates.
pub fn generator(rates: &Array2<f64>) -> Array2<f64> {
    let mut q = rates.clone();
    q.diag_mut().fill(0.0);
    let exits = q.sum_axis(ndarray::Axis(1));
    for (i, e) in exits.iter().enumerate() {
        q[[i, i]] = -e;
    }
    q
}

/// Reversible 4-state rates `q_ij = s_ij π_j` with symmetric exchangeabilities.
pub fn reversible_rates() -> (Array2<f64>, Array1<f64>) {
    let pi = array![0.1, 0.2, 0.3, 0.4];
    let s = array![
        [0.0, 1.0, 2.0, 0.5],
        [1.0, 0.0, 0.7, 1.5],
        [2.0, 0.7, 0.0, 1.1],
        [0.5, 1.5, 1.1, 0.0]
    ];
    let rates = Array2::from_shape_fn((4, 4), |(i, j)| s[[i, j]] * pi[j]);
    (rates, pi)
}

/// Kimura-style 4-state nucleotide rates (A, C, G, T) with transitions
/// A<->G and C<->T at rate `kappa` and transversions at rate 1.
pub fn k80_rates(kappa: f64) -> Array2<f64> {
    Array2::from_shape_fn((4, 4), |(i, j)| {
        if i == j {
            0.0
        } else if (i, j) == (0, 2) || (i, j) == (2, 0) || (i, j) == (1, 3) || (i, j) == (3, 1) {
            kappa
        } else {
            1.0
        }
    })
}

pub fn k80_transition_pairs() -> Vec<(usize, usize)> {
    vec![(0, 2), (2, 0), (1, 3), (3, 1)]
}

pub fn k80_transversion_pairs() -> Vec<(usize, usize)> {
    let ts = k80_transition_pairs();
    let mut out = Vec::new();
    for i in 0..4 {
        for j in 0..4 {
            if i != j && !ts.contains(&(i, j)) {
                out.push((i, j));
            }
        }
    }
    out
}

/// Symmetric two-state `P(t)` at unit switching rate.
pub fn p2(t: f64, i: usize, j: usize) -> f64 {
    let e = (-2.0 * t).exp();
    if i == j { 0.5 * (1.0 + e) } else { 0.5 * (1.0 - e) }
}

/// Arbitrary tree with one binary process at unit switching rates; column
/// `j` of each data row observes node `observed[j]`.
pub fn binary_tree_scene(
    edges: Vec<(usize, usize)>,
    edge_rates: &[f64],
    observed: Vec<usize>,
    data: Vec<Vec<i64>>,
    prior: &[f64],
) -> Scene {
    let node_count = edges.len() + 1;
    let nedges = edges.len();
    let nobs = observed.len();
    let space = StateSpace::new(vec![2]).unwrap();
    let tree = Tree::new(node_count, edges).unwrap();
    let def = definition_from_dense(&array![[0.0, 1.0], [1.0, 0.0]]);
    let process = RateProcess::new(0, &def, &space).unwrap();
    let nsites = data.len();
    let flat: Vec<i64> = data.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((nsites, nobs), flat).unwrap();
    let obs = Observations::new(observed, vec![0; nobs], data, node_count, &space).unwrap();
    let prior = RootPrior::new(&states(&[0, 1]), prior, &space).unwrap();
    Scene::new(
        space,
        tree,
        vec![process],
        vec![0; nedges],
        edge_rates.to_vec(),
        prior,
        obs,
    )
    .unwrap()
}

/// Star tree: root 0 with leaves 1..=k.
pub fn binary_star_scene(
    edge_rates: &[f64],
    leaf_data: Vec<Vec<i64>>,
    prior: &[f64],
) -> Scene {
    let k = edge_rates.len();
    binary_tree_scene(
        (1..=k).map(|c| (0, c)).collect(),
        edge_rates,
        (1..=k).collect(),
        leaf_data,
        prior,
    )
}

/// Rooted 4-leaf tree `((1,2)5,(3,4)6)0` renumbered densely, one process.
///
/// Node ids: 0 root, 1 and 2 internal, 3..=6 leaves.
pub fn four_leaf_scene(
    rates: &Array2<f64>,
    prior: &[f64],
    edge_rates: &[f64],
    leaf_data: Vec<Vec<i64>>,
    edge_order: &[usize],
) -> Scene {
    let n = rates.nrows();
    let base_edges = [(0, 1), (0, 2), (1, 3), (1, 4), (2, 5), (2, 6)];
    let edges: Vec<(usize, usize)> = edge_order.iter().map(|&e| base_edges[e]).collect();
    let permuted_rates: Vec<f64> = edge_order.iter().map(|&e| edge_rates[e]).collect();
    let space = StateSpace::new(vec![n]).unwrap();
    let tree = Tree::new(7, edges).unwrap();
    let process = RateProcess::new(0, &definition_from_dense(rates), &space).unwrap();
    let nsites = leaf_data.len();
    let flat: Vec<i64> = leaf_data.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((nsites, 4), flat).unwrap();
    let obs = Observations::new(vec![3, 4, 5, 6], vec![0; 4], data, 7, &space).unwrap();
    let ids: Vec<usize> = (0..n).collect();
    let prior = RootPrior::new(&states(&ids), prior, &space).unwrap();
    Scene::new(
        space,
        tree,
        vec![process],
        vec![0; 6],
        permuted_rates,
        prior,
        obs,
    )
    .unwrap()
}
