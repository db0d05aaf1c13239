mod common;

use common::{approx_eq, p2};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use ctmctree_rs::CtmcError;
use ctmctree_rs::io::json::{ResponseDocument, load_request, parse_request, save_response};
use ctmctree_rs::io::newick::parse_newick;
use ctmctree_rs::{EvaluateOptions, Response, evaluate};

fn unique_temp_path(prefix: &str, ext: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before unix epoch")
        .as_nanos();
    path.push(format!("{prefix}_{}_{}.{}", std::process::id(), nanos, ext));
    path
}

fn star_document() -> Value {
    json!({
        "scene": {
            "node_count": 3,
            "process_count": 1,
            "state_space_shape": [2],
            "tree": {
                "row_nodes": [0, 0],
                "column_nodes": [1, 2],
                "edge_rate_scaling_factors": [0.3, 1.1],
                "edge_processes": [0, 0]
            },
            "root_prior": {
                "states": [[0], [1]],
                "probabilities": [0.35, 0.65]
            },
            "process_definitions": [{
                "row_states": [[0], [1]],
                "column_states": [[1], [0]],
                "transition_rates": [1.0, 1.0]
            }],
            "observed_data": {
                "nodes": [1, 2],
                "variables": [0, 0],
                "iid_observations": [[0, 1], [1, 1]]
            }
        },
        "requests": [
            {"property": "DNNLOGL"},
            {"property": "SNNLOGL"},
            {"property": "SDSDWEL"},
            {
                "property": "WSNTRAN",
                "observation_reduction": {"sites": [1], "weights": [2.0]}
            }
        ]
    })
}

fn star_likelihood(a: usize, b: usize) -> f64 {
    (0..2)
        .map(|r| [0.35, 0.65][r] * p2(0.3, r, a) * p2(1.1, r, b))
        .sum()
}

#[test]
fn request_document_evaluates() {
    let doc = parse_request(&star_document().to_string()).unwrap();
    assert_eq!(doc.requests.len(), 4);
    let scene = doc.scene.build().unwrap();
    assert_eq!(scene.nsites(), 2);
    let eval = evaluate(&scene, &doc.requests, &EvaluateOptions::default()).unwrap();
    assert!(eval.feasibility);

    let expected = [star_likelihood(0, 1).ln(), star_likelihood(1, 1).ln()];
    match &eval.responses[0] {
        Some(Response::Vector(v)) => {
            approx_eq(v[0], expected[0], 1e-12);
            approx_eq(v[1], expected[1], 1e-12);
        }
        other => panic!("unexpected response {other:?}"),
    }
    match &eval.responses[1] {
        Some(Response::Scalar(v)) => approx_eq(*v, expected[0] + expected[1], 1e-12),
        other => panic!("unexpected response {other:?}"),
    }
    match &eval.responses[2] {
        Some(Response::Vector(v)) => {
            approx_eq(v[0], 2.0 * 0.3, 1e-10);
            approx_eq(v[1], 2.0 * 1.1, 1e-10);
        }
        other => panic!("unexpected response {other:?}"),
    }
    assert!(matches!(eval.responses[3], Some(Response::Scalar(v)) if v > 0.0));
}

#[test]
fn response_document_shape() {
    let doc = parse_request(&star_document().to_string()).unwrap();
    let scene = doc.scene.build().unwrap();
    let eval = evaluate(&scene, &doc.requests, &EvaluateOptions::default()).unwrap();

    let path = unique_temp_path("ctmctree_response", "json");
    save_response(&path, &ResponseDocument::from(&eval)).unwrap();
    let v: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(v["status"], "success");
    assert_eq!(v["feasibility"], true);
    let responses = v["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0].as_array().unwrap().len(), 2);
    assert!(responses[1].is_f64());
    assert_eq!(responses[2].as_array().unwrap().len(), 2);
    assert!(responses[3].is_f64());
    let _ = fs::remove_file(path);
}

#[test]
fn infeasible_expectations_serialize_as_null() {
    let mut raw = star_document();
    raw["scene"]["tree"]["edge_rate_scaling_factors"] = json!([0.0, 0.0]);
    raw["scene"]["root_prior"]["probabilities"] = json!([1.0, 0.0]);
    let doc = parse_request(&raw.to_string()).unwrap();
    let eval = evaluate(&doc.scene.build().unwrap(), &doc.requests, &EvaluateOptions::default())
        .unwrap();
    let v = serde_json::to_value(ResponseDocument::from(&eval)).unwrap();
    assert_eq!(v["feasibility"], false);
    assert!(v["responses"][2].is_null());
    assert_eq!(v["responses"][0], json!([0.0, 0.0]));
}

#[test]
fn gzipped_requests_load() {
    let path = unique_temp_path("ctmctree_request", "json.gz");
    let file = fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(star_document().to_string().as_bytes())
        .unwrap();
    encoder.finish().unwrap();

    let doc = load_request(&path).unwrap();
    assert_eq!(doc.scene.node_count, 3);
    assert_eq!(doc.requests[0].property, "DNNLOGL");
    let _ = fs::remove_file(path);
}

#[test]
fn scene_errors_keep_their_kind() {
    let mut raw = star_document();
    raw["scene"]["tree"]["column_nodes"] = json!([1, 1]);
    let doc = parse_request(&raw.to_string()).unwrap();
    let err = doc.scene.build().unwrap_err();
    assert!(format!("{err:#}").contains("invalid tree"));
    assert!(matches!(
        err.downcast_ref::<CtmcError>(),
        Some(CtmcError::Structure(_))
    ));

    let mut raw = star_document();
    raw["scene"]["root_prior"]["probabilities"] = json!([0.5, 0.6]);
    let err = parse_request(&raw.to_string())
        .unwrap()
        .scene
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmcError>(),
        Some(CtmcError::InvalidPrior(_))
    ));

    let mut raw = star_document();
    raw["scene"]["process_definitions"][0]["transition_rates"] = json!([1.0, -2.0]);
    let err = parse_request(&raw.to_string())
        .unwrap()
        .scene
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmcError>(),
        Some(CtmcError::InvalidProcess { process: 0, .. })
    ));

    let mut raw = star_document();
    raw["scene"]["observed_data"]["iid_observations"] = json!([[0, 2]]);
    let err = parse_request(&raw.to_string())
        .unwrap()
        .scene
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CtmcError>(),
        Some(CtmcError::InvalidObservation(_))
    ));

    let mut raw = star_document();
    raw["scene"]["process_count"] = json!(2);
    let err = parse_request(&raw.to_string())
        .unwrap()
        .scene
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("process_count is 2"));
}

#[test]
fn malformed_json_is_reported() {
    let err = parse_request("{\"scene\": ").unwrap_err();
    assert!(err.to_string().contains("failed to parse request document"));
}

#[test]
fn expect_weights_scale_default_transition_counts() {
    let mut raw = star_document();
    raw["requests"] = json!([{"property": "SSNTRAN"}]);
    let plain = parse_request(&raw.to_string()).unwrap();
    let base = evaluate(
        &plain.scene.build().unwrap(),
        &plain.requests,
        &EvaluateOptions::default(),
    )
    .unwrap();

    raw["scene"]["process_definitions"][0]["expect"] = json!([3.0, 3.0]);
    let weighted = parse_request(&raw.to_string()).unwrap();
    let scaled = evaluate(
        &weighted.scene.build().unwrap(),
        &weighted.requests,
        &EvaluateOptions::default(),
    )
    .unwrap();
    match (&base.responses[0], &scaled.responses[0]) {
        (Some(Response::Scalar(a)), Some(Response::Scalar(b))) => approx_eq(*b, 3.0 * a, 1e-10),
        other => panic!("unexpected responses {other:?}"),
    }
}

#[test]
fn newick_topology_replaces_edges() {
    let mut raw = star_document();
    raw["scene"]["tree"]["row_nodes"] = json!([]);
    raw["scene"]["tree"]["column_nodes"] = json!([]);
    raw["scene"]["tree"]["edge_rate_scaling_factors"] = json!([]);
    let mut doc = parse_request(&raw.to_string()).unwrap();
    let topology = parse_newick("(a:0.3,b:1.1)root;").unwrap();
    doc.scene.apply_topology(&topology).unwrap();
    assert_eq!(doc.scene.tree.row_nodes, vec![0, 0]);
    assert_eq!(doc.scene.tree.column_nodes, vec![1, 2]);
    assert_eq!(doc.scene.tree.edge_rate_scaling_factors, vec![0.3, 1.1]);

    let scene = doc.scene.build().unwrap();
    let eval = evaluate(&scene, &doc.requests, &EvaluateOptions::default()).unwrap();
    match &eval.responses[1] {
        Some(Response::Scalar(v)) => approx_eq(
            *v,
            star_likelihood(0, 1).ln() + star_likelihood(1, 1).ln(),
            1e-12,
        ),
        other => panic!("unexpected response {other:?}"),
    }

    let mut small = parse_request(&star_document().to_string()).unwrap();
    let wrong = parse_newick("((a:1,b:1):1,c:1);").unwrap();
    assert!(small.scene.apply_topology(&wrong).is_err());
}

#[test]
fn log_rate_derivatives_sum_over_sites() {
    let mut raw = star_document();
    raw["requests"] = json!([{"property": "SDNDERI"}, {"property": "WWNDERI",
        "observation_reduction": {"sites": [0], "weights": [1.0]},
        "edge_reduction": {"edges": [1], "weights": [1.0]}}]);
    let doc = parse_request(&raw.to_string()).unwrap();
    let eval = evaluate(&doc.scene.build().unwrap(), &doc.requests, &EvaluateOptions::default())
        .unwrap();
    let v = serde_json::to_value(ResponseDocument::from(&eval)).unwrap();
    assert_eq!(v["responses"][0].as_array().unwrap().len(), 2);

    // leaf 2 observed in state 1 at both sites: d/dt log p(r -> 1, t) at t = 1.1
    let t: f64 = 1.1;
    let e = (-2.0 * t).exp();
    let site0: f64 = (0..2)
        .map(|r| {
            let d = if r == 1 { -e } else { e };
            [0.35, 0.65][r] * p2(0.3, r, 0) * d
        })
        .sum::<f64>()
        * t
        / star_likelihood(0, 1);
    approx_eq(v["responses"][1].as_f64().unwrap(), site0, 1e-10);
}
