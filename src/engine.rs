//! Three-pass dynamic program over the tree.
//!
//! 1. Postorder: subtree likelihood arrays `(nstates, nsites)` per node.
//! 2. Preorder: head partials per edge and upward arrays per node, from
//!    which posterior marginals are formed on request.
//! 3. Expectations: per-edge, per-site conditional expectations of a path
//!    functional, from the Fréchet pair of each edge's process.

use indicatif::ProgressBar;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::error::{CtmcError, CtmcResult};
use crate::expm::{ExpmAction, ExpmStrategy, FrechetExpm};
use crate::operator::{LinearOperator, RdOperator};
use crate::progress;
use crate::scene::Scene;
use crate::utils::{normalize_columns, pseudo_reciprocal};

/// Per-node storage indexed by dense node id.
#[derive(Debug, Clone)]
pub struct NodeArena<T> {
    slots: Vec<Option<T>>,
}

impl<T> NodeArena<T> {
    pub fn new(node_count: usize) -> Self {
        Self {
            slots: (0..node_count).map(|_| None).collect(),
        }
    }

    pub fn insert(&mut self, node: usize, value: T) {
        self.slots[node] = Some(value);
    }

    pub fn get(&self, node: usize) -> Option<&T> {
        self.slots.get(node).and_then(Option::as_ref)
    }

    pub fn take(&mut self, node: usize) -> Option<T> {
        self.slots.get_mut(node).and_then(Option::take)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn missing(what: &str, index: usize) -> CtmcError {
    CtmcError::Structure(format!("{what} {index} was not computed"))
}

#[derive(Debug, Clone)]
pub struct Postorder {
    /// Subtree arrays; only the root survives unless retained.
    pub subtree: NodeArena<Array2<f64>>,
    /// `expm_mul(edge_rate, subtree_child)` per edge, when retained.
    pub messages: Vec<Option<Array2<f64>>>,
    retained: bool,
}

impl Postorder {
    pub fn retained(&self) -> bool {
        self.retained
    }
}

#[derive(Debug, Clone)]
pub struct Preorder {
    /// Prior-side array per node: the root prior broadcast over sites, pushed
    /// down through every edge above the node.
    pub upward: NodeArena<Array2<f64>>,
    /// Unnormalized head partial at each edge's parent.
    pub head_partials: Vec<Array2<f64>>,
}

/// Likelihood and expectation engine bound to one scene.
pub struct Engine<'a> {
    scene: &'a Scene,
    generators: Vec<RdOperator>,
    evaluators: Vec<Box<dyn ExpmAction>>,
    progress: bool,
}

impl<'a> Engine<'a> {
    /// Build one exponential evaluator per process.
    pub fn new(scene: &'a Scene, strategy: ExpmStrategy) -> CtmcResult<Self> {
        let generators = scene
            .processes()
            .iter()
            .map(|p| p.rate_operator())
            .collect::<CtmcResult<Vec<_>>>()?;
        let evaluators = generators
            .iter()
            .map(|q| strategy.build(q.clone()))
            .collect::<CtmcResult<Vec<_>>>()?;
        debug!(
            strategy = strategy.name(),
            processes = evaluators.len(),
            nstates = scene.nstates(),
            nsites = scene.nsites(),
            "engine ready"
        );
        Ok(Self {
            scene,
            generators,
            evaluators,
            progress: false,
        })
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    fn pass_bar(&self, len: usize, msg: &str) -> Option<ProgressBar> {
        self.progress
            .then(|| progress::bar(len as u64, "CTMC", msg))
    }

    fn indicator(&self, node: usize) -> Array2<f64> {
        self.scene
            .observations()
            .indicator_array(node, self.scene.space())
    }

    /// Subtree likelihood arrays, children before parents.
    ///
    /// With `retain` every subtree array and edge message is kept for the
    /// later passes; otherwise a child's array is released as soon as its
    /// parent consumes it.
    pub fn postorder(&self, retain: bool) -> CtmcResult<Postorder> {
        let tree = self.scene.tree();
        let mut subtree: NodeArena<Array2<f64>> = NodeArena::new(tree.node_count());
        let mut messages = vec![None; tree.edge_count()];
        let pb = self.pass_bar(tree.node_count(), "postorder");

        for &node in tree.postorder() {
            let mut arr = self.indicator(node);
            for &e in tree.child_edges(node) {
                let child = tree.edge(e).1;
                let message = {
                    let sub = if retain {
                        subtree.get(child).cloned()
                    } else {
                        subtree.take(child)
                    }
                    .ok_or_else(|| missing("subtree array of node", child))?;
                    let evaluator = &self.evaluators[self.scene.edge_process(e)];
                    evaluator.expm_mul(self.scene.edge_rate(e), sub.view())?
                };
                arr *= &message;
                if retain {
                    messages[e] = Some(message);
                }
            }
            trace!(node, subtree = ?arr, "subtree array");
            subtree.insert(node, arr);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        Ok(Postorder {
            subtree,
            messages,
            retained: retain,
        })
    }

    /// Per-site data likelihood `prior · subtree_root`.
    pub fn site_likelihoods(&self, post: &Postorder) -> CtmcResult<Array1<f64>> {
        let root = self.scene.tree().root();
        let arr = post
            .subtree
            .get(root)
            .ok_or_else(|| missing("subtree array of node", root))?;
        Ok(self.scene.prior().distribution().dot(arr))
    }

    /// Head partials and upward arrays, parents before children.
    ///
    /// Requires a retained postorder.
    pub fn preorder(&self, post: &Postorder) -> CtmcResult<Preorder> {
        if !post.retained {
            return Err(CtmcError::InvalidRequest(
                "preorder pass needs retained postorder arrays".to_string(),
            ));
        }
        let tree = self.scene.tree();
        let nsites = self.scene.nsites();
        let prior = self.scene.prior().distribution();

        let mut up: NodeArena<Array2<f64>> = NodeArena::new(tree.node_count());
        let root_up = Array2::from_shape_fn((prior.len(), nsites), |(i, _)| prior[i]);
        up.insert(tree.root(), root_up);

        let mut head_partials: Vec<Option<Array2<f64>>> = vec![None; tree.edge_count()];
        let pb = self.pass_bar(tree.node_count(), "preorder");

        for node in tree.preorder() {
            let base = up
                .get(node)
                .ok_or_else(|| missing("upward array of node", node))?
                * &self.indicator(node);
            let children = tree.child_edges(node);
            for &e in children {
                let mut head = base.clone();
                for &sibling in children.iter().filter(|&&s| s != e) {
                    let message = post.messages[sibling]
                        .as_ref()
                        .ok_or_else(|| missing("message of edge", sibling))?;
                    head *= message;
                }
                let evaluator = &self.evaluators[self.scene.edge_process(e)];
                let up_child = evaluator.expm_tmul(self.scene.edge_rate(e), head.view())?;
                up.insert(tree.edge(e).1, up_child);
                head_partials[e] = Some(head);
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let head_partials = head_partials
            .into_iter()
            .enumerate()
            .map(|(e, h)| h.ok_or_else(|| missing("head partial of edge", e)))
            .collect::<CtmcResult<Vec<_>>>()?;
        Ok(Preorder {
            upward: up,
            head_partials,
        })
    }

    /// Column-normalized posterior state distribution at `node`.
    pub fn marginal(&self, post: &Postorder, pre: &Preorder, node: usize) -> CtmcResult<Array2<f64>> {
        let up = pre
            .upward
            .get(node)
            .ok_or_else(|| missing("upward array of node", node))?;
        let sub = post
            .subtree
            .get(node)
            .ok_or_else(|| missing("subtree array of node", node))?;
        let mut marginal = up * sub;
        normalize_columns(&mut marginal);
        trace!(node, marginal = ?marginal, "marginal distribution");
        Ok(marginal)
    }

    /// Conditional expectations `(nedges, nsites)` of the functional whose
    /// Fréchet pair is `frechet[process]`.
    ///
    /// For edge `p -> c` and site `s`, with `A` the head partial, `L` the
    /// child's subtree array and `(P, K)` the Fréchet pair at the edge rate,
    /// the joint endpoint weight is `J = A[:, s] L[:, s]ᵀ ⊙ P` normalized to
    /// unit sum, and the expectation is `Σ J ⊙ K ⊙ P⁺` where `P⁺` is the
    /// elementwise pseudo-reciprocal. Sites with zero total weight report 0.
    pub fn edge_expectations(
        &self,
        post: &Postorder,
        pre: &Preorder,
        frechet: &[FrechetExpm],
    ) -> CtmcResult<Array2<f64>> {
        let tree = self.scene.tree();
        let nsites = self.scene.nsites();
        if frechet.len() != self.evaluators.len() {
            return Err(CtmcError::ShapeMismatch {
                context: "Fréchet pairs per process",
                expected: self.evaluators.len(),
                actual: frechet.len(),
            });
        }

        let rows = (0..tree.edge_count())
            .into_par_iter()
            .map(|e| {
                let child = tree.edge(e).1;
                let sub = post
                    .subtree
                    .get(child)
                    .ok_or_else(|| missing("subtree array of node", child))?;
                let head = &pre.head_partials[e];
                let (p, k) = frechet[self.scene.edge_process(e)]
                    .get_expm_and_frechet(self.scene.edge_rate(e))?;
                let w = ndarray::Zip::from(&k)
                    .and(&p)
                    .map_collect(|&k, &p| if p == 0.0 { 0.0 } else { k });

                let numer = (head * &w.dot(sub)).sum_axis(Axis(0));
                let denom = (head * &p.dot(sub)).sum_axis(Axis(0));
                let site_values = ndarray::Zip::from(&numer)
                    .and(&denom)
                    .map_collect(|&n, &d| n * pseudo_reciprocal(d));
                trace!(edge = e, expectations = ?site_values, "edge expectations");
                Ok(site_values)
            })
            .collect::<CtmcResult<Vec<Array1<f64>>>>()?;

        let mut out = Array2::zeros((tree.edge_count(), nsites));
        for (e, row) in rows.into_iter().enumerate() {
            out.row_mut(e).assign(&row);
        }
        Ok(out)
    }

    /// Derivatives `(nedges, nsites)` of each site's log-likelihood with
    /// respect to the log of each edge rate scaling factor.
    ///
    /// With `A` the head partial of edge `e`, `M = P·L` its message and `Q`
    /// its generator, `∂ℓ/∂r = Σ A ⊙ (Q·M)`, so the log-log derivative is
    /// `r · Σ A ⊙ (Q·M) / ℓ`. Sites with zero likelihood report 0.
    pub fn edge_log_rate_derivatives(
        &self,
        post: &Postorder,
        pre: &Preorder,
        likelihoods: &Array1<f64>,
    ) -> CtmcResult<Array2<f64>> {
        let tree = self.scene.tree();
        let inv_lik = likelihoods.mapv(pseudo_reciprocal);
        let rows = (0..tree.edge_count())
            .into_par_iter()
            .map(|e| {
                let message = post.messages[e]
                    .as_ref()
                    .ok_or_else(|| missing("message of edge", e))?;
                let q = &self.generators[self.scene.edge_process(e)];
                let dlik = (&pre.head_partials[e] * &q.apply(message.view())).sum_axis(Axis(0));
                let values = dlik * &inv_lik * self.scene.edge_rate(e);
                trace!(edge = e, derivatives = ?values, "log rate derivatives");
                Ok(values)
            })
            .collect::<CtmcResult<Vec<Array1<f64>>>>()?;

        let mut out = Array2::zeros((tree.edge_count(), self.scene.nsites()));
        for (e, row) in rows.into_iter().enumerate() {
            out.row_mut(e).assign(&row);
        }
        Ok(out)
    }
}

/// Per-site feasibility: the likelihood is finite and strictly positive.
pub fn site_feasibility(likelihoods: &Array1<f64>) -> Vec<bool> {
    likelihoods
        .iter()
        .map(|&l| l.is_finite() && l > 0.0)
        .collect()
}

/// Log-likelihoods with infeasible sites reported as 0.
pub fn site_log_likelihoods(likelihoods: &Array1<f64>) -> (Array1<f64>, bool) {
    let feasible = site_feasibility(likelihoods);
    let all_feasible = feasible.iter().all(|f| *f);
    if !all_feasible {
        let n_bad = feasible.iter().filter(|f| !**f).count();
        warn!(infeasible_sites = n_bad, "some sites have zero likelihood");
    }
    let logs = likelihoods
        .iter()
        .zip(&feasible)
        .map(|(&l, &ok)| if ok { l.ln() } else { 0.0 })
        .collect();
    (logs, all_feasible)
}
