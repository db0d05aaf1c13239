//! Property requests and their evaluation against a scene.
//!
//! A property code has seven characters: the site reduction, the edge
//! reduction, the state reduction, then the property itself, e.g. `SNNLOGL`
//! (total log-likelihood), `DDWDWEL` (weighted dwell time per site and
//! edge) or `SDNDERI` (log-likelihood gradient on log edge rates).

use anyhow::{Context, Result, bail};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::engine::{Engine, site_log_likelihoods};
use crate::error::CtmcError;
use crate::expm::{ExpmStrategy, FrechetExpm};
use crate::scene::Scene;
use crate::sparse::CsrMatrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationReduction {
    pub sites: Vec<usize>,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeReduction {
    pub edges: Vec<usize>,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReduction {
    pub states: Vec<Vec<usize>>,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionReduction {
    pub row_states: Vec<Vec<usize>>,
    pub column_states: Vec<Vec<usize>>,
    pub weights: Vec<f64>,
}

/// One requested output, as read from a request document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRequest {
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_reduction: Option<ObservationReduction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_reduction: Option<EdgeReduction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_reduction: Option<StateReduction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_reduction: Option<TransitionReduction>,
}

impl PropertyRequest {
    pub fn new(property: &str) -> Self {
        Self {
            property: property.to_string(),
            observation_reduction: None,
            edge_reduction: None,
            state_reduction: None,
            transition_reduction: None,
        }
    }
}

// ---- Property codes ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteMode {
    Sum,
    Weighted,
    PerSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    None,
    PerEdge,
    Sum,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMode {
    None,
    Sum,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    LogLikelihood,
    Dwell,
    Transition,
    Derivative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyCode {
    pub sites: SiteMode,
    pub edges: EdgeMode,
    pub states: StateMode,
    pub property: Property,
}

impl PropertyCode {
    pub fn parse(code: &str) -> Result<Self, CtmcError> {
        let bad = |why: &str| CtmcError::InvalidRequest(format!("property {code:?}: {why}"));
        if code.len() != 7 || !code.is_ascii() {
            return Err(bad("expected seven ASCII characters"));
        }
        let b = code.as_bytes();
        let sites = match b[0] {
            b'S' => SiteMode::Sum,
            b'W' => SiteMode::Weighted,
            b'D' => SiteMode::PerSite,
            _ => return Err(bad("site reduction must be S, W or D")),
        };
        let edges = match b[1] {
            b'N' => EdgeMode::None,
            b'D' => EdgeMode::PerEdge,
            b'S' => EdgeMode::Sum,
            b'W' => EdgeMode::Weighted,
            _ => return Err(bad("edge reduction must be N, D, S or W")),
        };
        let states = match b[2] {
            b'N' => StateMode::None,
            b'S' => StateMode::Sum,
            b'W' => StateMode::Weighted,
            _ => return Err(bad("state reduction must be N, S or W")),
        };
        let property = match &code[3..] {
            "LOGL" => Property::LogLikelihood,
            "DWEL" => Property::Dwell,
            "TRAN" => Property::Transition,
            "DERI" => Property::Derivative,
            _ => return Err(bad("unknown property")),
        };

        match property {
            Property::LogLikelihood => {
                if edges != EdgeMode::None || states != StateMode::None {
                    return Err(bad("log-likelihood takes no edge or state reduction"));
                }
            }
            Property::Dwell => {
                if edges == EdgeMode::None {
                    return Err(bad("dwell times need an edge reduction"));
                }
                if states == StateMode::None {
                    return Err(bad("dwell times need a state reduction"));
                }
            }
            Property::Transition => {
                if edges == EdgeMode::None {
                    return Err(bad("transition counts need an edge reduction"));
                }
                if states != StateMode::None {
                    return Err(bad("transition counts take no state reduction"));
                }
            }
            Property::Derivative => {
                if edges == EdgeMode::None {
                    return Err(bad("edge rate derivatives need an edge reduction"));
                }
                if states != StateMode::None {
                    return Err(bad("edge rate derivatives take no state reduction"));
                }
            }
        }

        Ok(Self {
            sites,
            edges,
            states,
            property,
        })
    }

    /// The property needs the preorder pass.
    pub fn needs_expectations(&self) -> bool {
        self.property != Property::LogLikelihood
    }
}

// ---- Evaluation ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateOptions {
    pub strategy: ExpmStrategy,
    pub progress: bool,
}

/// Reduced output of one request; matrices are indexed `[site][edge]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Every site has finite positive likelihood.
    pub feasibility: bool,
    /// Per-site log-likelihoods, 0 at infeasible sites.
    pub log_likelihoods: Array1<f64>,
    /// One entry per request; expectations are `None` unless feasible.
    pub responses: Vec<Option<Response>>,
}

impl Evaluation {
    pub fn total_log_likelihood(&self) -> f64 {
        self.log_likelihoods.sum()
    }
}

/// Evaluate every request against `scene` in one postorder sweep.
pub fn evaluate(
    scene: &Scene,
    requests: &[PropertyRequest],
    options: &EvaluateOptions,
) -> Result<Evaluation> {
    let codes = requests
        .iter()
        .map(|r| {
            let code = PropertyCode::parse(&r.property)?;
            check_reductions(scene, r, &code)?;
            Ok(code)
        })
        .collect::<Result<Vec<_>, CtmcError>>()
        .context("invalid property request")?;
    let need_expectations = codes.iter().any(PropertyCode::needs_expectations);

    let engine = Engine::new(scene, options.strategy)
        .context("failed to build exponential evaluators")?
        .with_progress(options.progress);

    let post = {
        let _span = info_span!("postorder", retain = need_expectations).entered();
        engine.postorder(need_expectations)?
    };
    let likelihoods = engine.site_likelihoods(&post)?;
    let (log_likelihoods, feasibility) = site_log_likelihoods(&likelihoods);
    debug!(
        feasibility,
        total = log_likelihoods.sum(),
        "site likelihoods computed"
    );

    let pre = if need_expectations && feasibility {
        let _span = info_span!("preorder").entered();
        Some(engine.preorder(&post)?)
    } else {
        None
    };

    let mut responses = Vec::with_capacity(requests.len());
    for (i, (request, code)) in requests.iter().zip(&codes).enumerate() {
        let response = match code.property {
            Property::LogLikelihood => Some(reduce_sites(
                log_likelihoods.view(),
                code.sites,
                request.observation_reduction.as_ref(),
            )?),
            Property::Derivative => match &pre {
                None => None,
                Some(pre) => {
                    let _span = info_span!("derivatives", request = i).entered();
                    let per_edge = engine.edge_log_rate_derivatives(&post, pre, &likelihoods)?;
                    Some(reduce_expectations(per_edge, code, request)?)
                }
            },
            Property::Dwell | Property::Transition => match &pre {
                None => None,
                Some(pre) => {
                    let _span = info_span!("expectations", request = i).entered();
                    let frechet = frechet_pairs(scene, request, code, options.strategy)
                        .with_context(|| format!("request {i} ({})", request.property))?;
                    let per_edge = engine.edge_expectations(&post, pre, &frechet)?;
                    Some(reduce_expectations(per_edge, code, request)?)
                }
            },
        };
        responses.push(response);
    }

    Ok(Evaluation {
        feasibility,
        log_likelihoods,
        responses,
    })
}

fn frechet_pairs(
    scene: &Scene,
    request: &PropertyRequest,
    code: &PropertyCode,
    strategy: ExpmStrategy,
) -> Result<Vec<FrechetExpm>> {
    let space = scene.space();
    let n = space.nstates();
    match code.property {
        Property::Dwell => {
            let weights = match (code.states, &request.state_reduction) {
                (StateMode::Weighted, Some(r)) => {
                    let mut c = Array1::<f64>::zeros(n);
                    for (state, w) in r.states.iter().zip(&r.weights) {
                        c[space.ravel(state)?] += w;
                    }
                    c
                }
                (StateMode::Weighted, None) => bail!("weighted dwell needs a state_reduction"),
                _ => Array1::ones(n),
            };
            scene
                .processes()
                .iter()
                .map(|p| -> Result<FrechetExpm> {
                    Ok(FrechetExpm::new(p.dwell_operator(weights.clone())?, strategy)?)
                })
                .collect()
        }
        Property::Transition => {
            let weights = match &request.transition_reduction {
                Some(r) => {
                    let mut rows = Vec::with_capacity(r.weights.len());
                    let mut cols = Vec::with_capacity(r.weights.len());
                    for (a, b) in r.row_states.iter().zip(&r.column_states) {
                        rows.push(space.ravel(a)?);
                        cols.push(space.ravel(b)?);
                    }
                    Some(CsrMatrix::from_triplets(n, n, &rows, &cols, &r.weights)?)
                }
                None => None,
            };
            scene
                .processes()
                .iter()
                .map(|p| -> Result<FrechetExpm> {
                    Ok(FrechetExpm::new(
                        p.transition_operator(weights.as_ref())?,
                        strategy,
                    )?)
                })
                .collect()
        }
        Property::LogLikelihood | Property::Derivative => Ok(Vec::new()),
    }
}

fn invalid(msg: String) -> CtmcError {
    CtmcError::InvalidRequest(msg)
}

fn check_weights(what: &str, n_index: usize, weights: &[f64]) -> Result<(), CtmcError> {
    if n_index != weights.len() {
        return Err(invalid(format!(
            "{what}: {n_index} indices but {} weights",
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
        return Err(invalid(format!("{what}: weight {w} is not finite")));
    }
    Ok(())
}

/// Validate the reductions a code needs against the scene's dimensions.
fn check_reductions(
    scene: &Scene,
    request: &PropertyRequest,
    code: &PropertyCode,
) -> Result<(), CtmcError> {
    if code.sites == SiteMode::Weighted {
        let r = request
            .observation_reduction
            .as_ref()
            .ok_or_else(|| invalid("W site reduction needs observation_reduction".to_string()))?;
        check_weights("observation_reduction", r.sites.len(), &r.weights)?;
        if let Some(s) = r.sites.iter().find(|s| **s >= scene.nsites()) {
            return Err(invalid(format!(
                "observation_reduction: site {s} outside 0..{}",
                scene.nsites()
            )));
        }
    }
    if code.edges == EdgeMode::Weighted {
        let r = request
            .edge_reduction
            .as_ref()
            .ok_or_else(|| invalid("W edge reduction needs edge_reduction".to_string()))?;
        check_weights("edge_reduction", r.edges.len(), &r.weights)?;
        let nedges = scene.tree().edge_count();
        if let Some(e) = r.edges.iter().find(|e| **e >= nedges) {
            return Err(invalid(format!(
                "edge_reduction: edge {e} outside 0..{nedges}"
            )));
        }
    }
    if code.states == StateMode::Weighted {
        let r = request
            .state_reduction
            .as_ref()
            .ok_or_else(|| invalid("W state reduction needs state_reduction".to_string()))?;
        check_weights("state_reduction", r.states.len(), &r.weights)?;
        for state in &r.states {
            scene
                .space()
                .ravel(state)
                .map_err(|e| invalid(format!("state_reduction: {e}")))?;
        }
    }
    if let Some(r) = &request.transition_reduction {
        check_weights("transition_reduction", r.row_states.len(), &r.weights)?;
        if r.column_states.len() != r.row_states.len() {
            return Err(invalid(format!(
                "transition_reduction: {} row states but {} column states",
                r.row_states.len(),
                r.column_states.len()
            )));
        }
        for state in r.row_states.iter().chain(&r.column_states) {
            scene
                .space()
                .ravel(state)
                .map_err(|e| invalid(format!("transition_reduction: {e}")))?;
        }
    }
    Ok(())
}

fn reduce_sites(
    values: ndarray::ArrayView1<f64>,
    mode: SiteMode,
    reduction: Option<&ObservationReduction>,
) -> Result<Response> {
    Ok(match mode {
        SiteMode::PerSite => Response::Vector(values.to_vec()),
        SiteMode::Sum => Response::Scalar(values.sum()),
        SiteMode::Weighted => {
            let r = reduction.context("missing observation_reduction")?;
            Response::Scalar(
                r.sites
                    .iter()
                    .zip(&r.weights)
                    .map(|(&s, &w)| w * values[s])
                    .sum(),
            )
        }
    })
}

/// Reduce a `(nedges, nsites)` expectation array as the code asks.
fn reduce_expectations(
    per_edge: Array2<f64>,
    code: &PropertyCode,
    request: &PropertyRequest,
) -> Result<Response> {
    let edge_weights = |r: Option<&EdgeReduction>| -> Result<Array1<f64>> {
        let r = r.context("missing edge_reduction")?;
        let mut w = Array1::zeros(per_edge.nrows());
        for (&e, &x) in r.edges.iter().zip(&r.weights) {
            w[e] += x;
        }
        Ok(w)
    };
    let site_weights = |r: Option<&ObservationReduction>| -> Result<Array1<f64>> {
        let r = r.context("missing observation_reduction")?;
        let mut w = Array1::zeros(per_edge.ncols());
        for (&s, &x) in r.sites.iter().zip(&r.weights) {
            w[s] += x;
        }
        Ok(w)
    };

    // per site, after edges are reduced
    let by_site: Option<Array1<f64>> = match code.edges {
        EdgeMode::PerEdge | EdgeMode::None => None,
        EdgeMode::Sum => Some(per_edge.sum_axis(Axis(0))),
        EdgeMode::Weighted => Some(edge_weights(request.edge_reduction.as_ref())?.dot(&per_edge)),
    };

    Ok(match (by_site, code.sites) {
        (Some(v), SiteMode::PerSite) => Response::Vector(v.to_vec()),
        (Some(v), SiteMode::Sum) => Response::Scalar(v.sum()),
        (Some(v), SiteMode::Weighted) => Response::Scalar(
            site_weights(request.observation_reduction.as_ref())?.dot(&v),
        ),
        (None, SiteMode::PerSite) => Response::Matrix(
            per_edge
                .t()
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
        ),
        (None, SiteMode::Sum) => Response::Vector(per_edge.sum_axis(Axis(1)).to_vec()),
        (None, SiteMode::Weighted) => Response::Vector(
            per_edge
                .dot(&site_weights(request.observation_reduction.as_ref())?)
                .to_vec(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_codes_parse() {
        let code = PropertyCode::parse("SNNLOGL").unwrap();
        assert_eq!(code.sites, SiteMode::Sum);
        assert_eq!(code.property, Property::LogLikelihood);
        let code = PropertyCode::parse("DWSDWEL").unwrap();
        assert_eq!(code.edges, EdgeMode::Weighted);
        assert_eq!(code.states, StateMode::Sum);
        assert!(PropertyCode::parse("SDNTRAN").unwrap().needs_expectations());
        let code = PropertyCode::parse("WDNDERI").unwrap();
        assert_eq!(code.property, Property::Derivative);
        assert!(code.needs_expectations());
    }

    #[test]
    fn inconsistent_codes_are_rejected() {
        for bad in [
            "SDNLOGL", "SNSDWEL", "SDNDWEL", "SDSTRAN", "SNNDERI", "SDSDERI", "XNNLOGL",
            "SNNLOG", "SNNFOOO",
        ] {
            assert!(
                matches!(PropertyCode::parse(bad), Err(CtmcError::InvalidRequest(_))),
                "{bad} should be rejected"
            );
        }
    }
}
