//! Rooted tree over dense node ids `0..node_count`.
//!
//! Edges are indexed in input order; every non-root node owns exactly one
//! incoming edge.

use crate::error::{CtmcError, CtmcResult};

#[derive(Debug, Clone)]
pub struct Tree {
    node_count: usize,
    edges: Vec<(usize, usize)>,
    parent_edge: Vec<Option<usize>>,
    child_edges: Vec<Vec<usize>>,
    root: usize,
    postorder: Vec<usize>,
}

impl Tree {
    /// Validate `(parent, child)` edges and precompute traversal orders.
    pub fn new(node_count: usize, edges: Vec<(usize, usize)>) -> CtmcResult<Self> {
        if node_count == 0 {
            return Err(CtmcError::Structure("the tree has no nodes".to_string()));
        }
        if edges.len() != node_count - 1 {
            return Err(CtmcError::Structure(format!(
                "{} nodes need {} edges, got {}",
                node_count,
                node_count - 1,
                edges.len()
            )));
        }

        let mut parent_edge = vec![None; node_count];
        let mut child_edges = vec![Vec::new(); node_count];
        for (e, &(parent, child)) in edges.iter().enumerate() {
            if parent >= node_count || child >= node_count {
                return Err(CtmcError::Structure(format!(
                    "edge {e} ({parent} -> {child}) refers to a node outside 0..{node_count}"
                )));
            }
            if parent == child {
                return Err(CtmcError::Structure(format!("edge {e} is a self-loop")));
            }
            if parent_edge[child].is_some() {
                return Err(CtmcError::Structure(format!(
                    "node {child} has more than one parent"
                )));
            }
            parent_edge[child] = Some(e);
            child_edges[parent].push(e);
        }

        let mut roots = (0..node_count).filter(|&v| parent_edge[v].is_none());
        let root = roots
            .next()
            .ok_or_else(|| CtmcError::Structure("no root node".to_string()))?;
        if let Some(other) = roots.next() {
            return Err(CtmcError::Structure(format!(
                "multiple roots ({root} and {other})"
            )));
        }

        let postorder = postorder_from(root, &edges, &child_edges);
        if postorder.len() != node_count {
            return Err(CtmcError::Structure(format!(
                "only {} of {} nodes are reachable from root {root}",
                postorder.len(),
                node_count
            )));
        }

        Ok(Self {
            node_count,
            edges,
            parent_edge,
            child_edges,
            root,
            postorder,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn edge(&self, e: usize) -> (usize, usize) {
        self.edges[e]
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn parent_edge(&self, node: usize) -> Option<usize> {
        self.parent_edge[node]
    }

    pub fn child_edges(&self, node: usize) -> &[usize] {
        &self.child_edges[node]
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.child_edges[node].is_empty()
    }

    /// Children before parents; the root is last.
    pub fn postorder(&self) -> &[usize] {
        &self.postorder
    }

    /// Parents before children; the root is first.
    pub fn preorder(&self) -> impl Iterator<Item = usize> + '_ {
        self.postorder.iter().rev().copied()
    }
}

fn postorder_from(root: usize, edges: &[(usize, usize)], child_edges: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(child_edges.len());
    let mut visited = vec![false; child_edges.len()];
    let mut stack = vec![(root, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if visited[node] {
            continue;
        }
        visited[node] = true;
        stack.push((node, true));
        for &e in child_edges[node].iter().rev() {
            stack.push((edges[e].1, false));
        }
    }
    order
}
