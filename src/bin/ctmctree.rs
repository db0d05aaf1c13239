use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use ctmctree_rs::io::json::{ResponseDocument, load_request, save_response};
use ctmctree_rs::io::newick::read_newick;
use ctmctree_rs::progress;
use ctmctree_rs::{EvaluateOptions, ExpmStrategy, Response, evaluate};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Strategy {
    Pade,
    Eigen,
    Action,
}

impl From<Strategy> for ExpmStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Pade => ExpmStrategy::Pade,
            Strategy::Eigen => ExpmStrategy::Eigen,
            Strategy::Action => ExpmStrategy::Action,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ctmctree")]
#[command(about = "CTMC likelihoods and path expectations on trees", long_about = None)]
struct Cli {
    /// Request document (JSON, optionally .gz)
    input_file: PathBuf,
    /// Response document to write
    output_file: PathBuf,
    #[arg(long, value_enum, default_value_t = Strategy::Pade)]
    strategy: Strategy,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(
        long,
        help = "Newick topology replacing the scene's edge list (nodes numbered in preorder)"
    )]
    topology: Option<PathBuf>,
    #[arg(long)]
    no_progress: bool,
    #[arg(long, short, help = "Raise the default log level to debug")]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Some(n_threads) = cli.threads {
        if n_threads == 0 {
            bail!("--threads must be >= 1");
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .map_err(|e| anyhow!("failed to configure Rayon global thread pool: {e}"))?;
    }

    let mut doc = if cli.no_progress {
        load_request(&cli.input_file)?
    } else {
        let pb = progress::spinner("IO", "Reading request");
        let doc = load_request(&cli.input_file)?;
        pb.finish_with_message("Reading request done");
        doc
    };

    if let Some(path) = &cli.topology {
        let topology = read_newick(path)?;
        doc.scene
            .apply_topology(&topology)
            .with_context(|| format!("failed to apply topology {:?}", path))?;
    }

    let scene = doc.scene.build().context("failed to build scene")?;
    info!(
        nodes = scene.tree().node_count(),
        states = scene.nstates(),
        sites = scene.nsites(),
        requests = doc.requests.len(),
        "scene loaded"
    );

    let options = EvaluateOptions {
        strategy: cli.strategy.into(),
        progress: !cli.no_progress,
    };
    let evaluation = evaluate(&scene, &doc.requests, &options)?;

    println!("Feasible: {}", evaluation.feasibility);
    for (request, response) in doc.requests.iter().zip(&evaluation.responses) {
        if request.property == "SNNLOGL" {
            if let Some(Response::Scalar(v)) = response {
                println!("Total log-likelihood: {v}");
            }
        }
    }

    save_response(&cli.output_file, &ResponseDocument::from(&evaluation))?;
    println!("Response: {}", cli.output_file.display());
    Ok(())
}
