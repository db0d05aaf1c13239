use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_path(prefix: &str, ext: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before unix epoch")
        .as_nanos();
    path.push(format!("{prefix}_{}_{}.{}", std::process::id(), nanos, ext));
    path
}

fn find_ctmctree_binary() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_ctmctree") {
        return PathBuf::from(path);
    }

    let current = std::env::current_exe().expect("failed to get current exe path");
    let deps_dir = current
        .parent()
        .expect("failed to get deps dir from current exe")
        .to_path_buf();
    let debug_dir = deps_dir
        .parent()
        .expect("failed to get debug dir from deps dir")
        .to_path_buf();

    let direct = debug_dir.join("ctmctree");
    if direct.exists() {
        return direct;
    }
    panic!("failed to find ctmctree binary in CARGO_BIN_EXE_ctmctree or target/debug");
}

fn request(edge_rates: Value) -> Value {
    json!({
        "scene": {
            "node_count": 4,
            "process_count": 1,
            "state_space_shape": [2],
            "tree": {
                "row_nodes": [0, 0, 0],
                "column_nodes": [1, 2, 3],
                "edge_rate_scaling_factors": edge_rates,
                "edge_processes": [0, 0, 0]
            },
            "root_prior": {"states": [[0], [1]], "probabilities": [0.5, 0.5]},
            "process_definitions": [{
                "row_states": [[0], [1]],
                "column_states": [[1], [0]],
                "transition_rates": [1.0, 2.0]
            }],
            "observed_data": {
                "nodes": [1, 2, 3],
                "variables": [0, 0, 0],
                "iid_observations": [[0, 0, 1], [1, -1, 1]]
            }
        },
        "requests": [
            {"property": "SNNLOGL"},
            {"property": "DDNTRAN"},
            {"property": "SDSDWEL"}
        ]
    })
}

#[test]
fn cli_evaluates_request_and_writes_json() {
    let input = unique_temp_path("ctmctree_cli_input", "json");
    let output = unique_temp_path("ctmctree_cli_output", "json");
    fs::write(&input, request(json!([0.2, 0.4, 0.8])).to_string())
        .expect("failed to write cli test input");

    let exe = find_ctmctree_binary();
    let run = Command::new(exe)
        .arg(&input)
        .arg(&output)
        .arg("--strategy")
        .arg("action")
        .arg("--no-progress")
        .output()
        .expect("failed to run ctmctree binary");
    assert!(run.status.success(), "ctmctree exited with non-zero status");
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.contains("Feasible: true"));
    assert!(stdout.contains("Total log-likelihood:"));

    let out = fs::read_to_string(&output).expect("failed to read ctmctree output json");
    let v: Value = serde_json::from_str(&out).expect("output json is invalid");
    assert_eq!(v["status"], "success");
    assert_eq!(v["feasibility"], true);
    let responses = v["responses"].as_array().expect("responses array");
    assert_eq!(responses.len(), 3);
    assert!(responses[0].as_f64().expect("scalar log-likelihood") < 0.0);
    let matrix = responses[1].as_array().expect("per-site matrix");
    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix[0].as_array().map(Vec::len), Some(3));
    let dwell = responses[2].as_array().expect("per-edge vector");
    for (got, t) in dwell.iter().zip([0.2, 0.4, 0.8]) {
        let got = got.as_f64().expect("number");
        assert!((got - 2.0 * t).abs() < 1e-9, "{got} vs {}", 2.0 * t);
    }

    let _ = fs::remove_file(input);
    let _ = fs::remove_file(output);
}

#[test]
fn cli_takes_edges_from_newick_topology() {
    let input = unique_temp_path("ctmctree_cli_topo_input", "json");
    let topology = unique_temp_path("ctmctree_cli_topo", "nwk");
    let output = unique_temp_path("ctmctree_cli_topo_output", "json");
    let direct = unique_temp_path("ctmctree_cli_topo_direct", "json");
    fs::write(&input, request(json!([])).to_string()).expect("failed to write cli test input");
    fs::write(&topology, "(a:0.2,b:0.4,c:0.8);\n").expect("failed to write topology");
    let reference = unique_temp_path("ctmctree_cli_topo_reference", "json");
    fs::write(&reference, request(json!([0.2, 0.4, 0.8])).to_string())
        .expect("failed to write reference input");

    let exe = find_ctmctree_binary();
    let status = Command::new(&exe)
        .arg(&input)
        .arg(&output)
        .arg("--topology")
        .arg(&topology)
        .arg("--no-progress")
        .status()
        .expect("failed to run ctmctree binary");
    assert!(status.success(), "ctmctree exited with non-zero status");
    let status = Command::new(&exe)
        .arg(&reference)
        .arg(&direct)
        .arg("--no-progress")
        .status()
        .expect("failed to run ctmctree binary");
    assert!(status.success(), "ctmctree exited with non-zero status");

    let a: Value = serde_json::from_str(&fs::read_to_string(&output).expect("topology output"))
        .expect("output json is invalid");
    let b: Value = serde_json::from_str(&fs::read_to_string(&direct).expect("direct output"))
        .expect("output json is invalid");
    let la = a["responses"][0].as_f64().expect("scalar");
    let lb = b["responses"][0].as_f64().expect("scalar");
    assert!((la - lb).abs() < 1e-12);

    for path in [input, topology, output, direct, reference] {
        let _ = fs::remove_file(path);
    }
}

#[test]
fn cli_rejects_malformed_requests() {
    let input = unique_temp_path("ctmctree_cli_bad_input", "json");
    let output = unique_temp_path("ctmctree_cli_bad_output", "json");
    let mut doc = request(json!([0.2, 0.4, 0.8]));
    doc["requests"] = json!([{"property": "SNNFOOO"}]);
    fs::write(&input, doc.to_string()).expect("failed to write cli test input");

    let run = Command::new(find_ctmctree_binary())
        .arg(&input)
        .arg(&output)
        .arg("--no-progress")
        .output()
        .expect("failed to run ctmctree binary");
    assert!(!run.status.success());
    assert!(String::from_utf8_lossy(&run.stderr).contains("invalid property request"));
    assert!(!output.exists());

    let _ = fs::remove_file(input);
}
