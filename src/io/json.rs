use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use crate::io::newick::NewickTopology;
use crate::observation::Observations;
use crate::process::{ProcessDefinition, RateProcess, StateSpace};
use crate::request::{Evaluation, PropertyRequest, Response};
use crate::scene::{RootPrior, Scene};
use crate::tree::Tree;

/// Read a text file, decompressing `.gz` transparently.
pub fn read_to_string(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .with_context(|| format!("failed to read {:?}", path))?;
    Ok(content)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    pub row_nodes: Vec<usize>,
    pub column_nodes: Vec<usize>,
    #[serde(default)]
    pub edge_rate_scaling_factors: Vec<f64>,
    pub edge_processes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootPriorSpec {
    pub states: Vec<Vec<usize>>,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedDataSpec {
    pub nodes: Vec<usize>,
    pub variables: Vec<usize>,
    pub iid_observations: Vec<Vec<i64>>,
}

/// Scene as written in a request document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSpec {
    pub node_count: usize,
    pub process_count: usize,
    pub state_space_shape: Vec<usize>,
    pub tree: TreeSpec,
    pub root_prior: RootPriorSpec,
    pub process_definitions: Vec<ProcessDefinition>,
    pub observed_data: ObservedDataSpec,
}

impl SceneSpec {
    /// Validate every section and assemble a [`Scene`].
    pub fn build(&self) -> Result<Scene> {
        let space = StateSpace::new(self.state_space_shape.clone())
            .context("invalid state_space_shape")?;

        if self.tree.row_nodes.len() != self.tree.column_nodes.len() {
            bail!(
                "tree has {} row nodes but {} column nodes",
                self.tree.row_nodes.len(),
                self.tree.column_nodes.len()
            );
        }
        let edges = self
            .tree
            .row_nodes
            .iter()
            .copied()
            .zip(self.tree.column_nodes.iter().copied())
            .collect();
        let tree = Tree::new(self.node_count, edges).context("invalid tree")?;

        if self.process_count != self.process_definitions.len() {
            bail!(
                "process_count is {} but {} process definitions were given",
                self.process_count,
                self.process_definitions.len()
            );
        }
        let processes = self
            .process_definitions
            .iter()
            .enumerate()
            .map(|(i, def)| RateProcess::new(i, def, &space))
            .collect::<Result<Vec<_>, _>>()
            .context("invalid process definition")?;

        let prior = RootPrior::new(
            &self.root_prior.states,
            &self.root_prior.probabilities,
            &space,
        )
        .context("invalid root_prior")?;

        let data = &self.observed_data;
        let nobs = data.nodes.len();
        let nsites = data.iid_observations.len();
        let mut flat = Vec::with_capacity(nsites * nobs);
        for (site, row) in data.iid_observations.iter().enumerate() {
            if row.len() != nobs {
                bail!(
                    "observation row {site} has {} values, expected {nobs}",
                    row.len()
                );
            }
            flat.extend_from_slice(row);
        }
        let matrix = Array2::from_shape_vec((nsites, nobs), flat)
            .context("failed to shape iid_observations")?;
        let observations = Observations::new(
            data.nodes.clone(),
            data.variables.clone(),
            matrix,
            self.node_count,
            &space,
        )
        .context("invalid observed_data")?;

        let scene = Scene::new(
            space,
            tree,
            processes,
            self.tree.edge_processes.clone(),
            self.tree.edge_rate_scaling_factors.clone(),
            prior,
            observations,
        )
        .context("inconsistent scene")?;
        Ok(scene)
    }

    /// Replace the edge list with a parsed topology.
    ///
    /// Branch lengths become the edge rate scaling factors when the scene
    /// leaves those empty. Observation node ids refer to the new numbering.
    pub fn apply_topology(&mut self, topology: &NewickTopology) -> Result<()> {
        if topology.node_count != self.node_count {
            bail!(
                "topology has {} nodes, the scene declares {}",
                topology.node_count,
                self.node_count
            );
        }
        self.tree.row_nodes = topology.edges.iter().map(|e| e.0).collect();
        self.tree.column_nodes = topology.edges.iter().map(|e| e.1).collect();
        if self.tree.edge_rate_scaling_factors.is_empty() {
            self.tree.edge_rate_scaling_factors = topology
                .complete_lengths()
                .context("topology lacks branch lengths and the scene has no edge rates")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDocument {
    pub scene: SceneSpec,
    pub requests: Vec<PropertyRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    pub status: String,
    pub feasibility: bool,
    pub responses: Vec<Option<Response>>,
}

impl From<&Evaluation> for ResponseDocument {
    fn from(eval: &Evaluation) -> Self {
        Self {
            status: "success".to_string(),
            feasibility: eval.feasibility,
            responses: eval.responses.clone(),
        }
    }
}

pub fn parse_request(text: &str) -> Result<RequestDocument> {
    serde_json::from_str(text).context("failed to parse request document")
}

pub fn load_request(path: &Path) -> Result<RequestDocument> {
    let text = read_to_string(path)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {:?}", path))
}

pub fn save_response(path: &Path, doc: &ResponseDocument) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, doc)
        .with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}
