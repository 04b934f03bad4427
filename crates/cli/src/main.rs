//! odflow CLI - Spatial autocorrelation of origin-destination flows

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use odflow_algorithms::statistics::{
    vector_morans_i_with_control, MoranParams, PermutationStatus, VectorMoranResult,
};
use odflow_core::io::read_vectors;
use odflow_core::{Anchor, DenseWeights, InverseDistanceParams, VectorSample, WeightTransform};
use odflow_parallel::{num_threads, CancelToken, ProcessingMode};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "odflow")]
#[command(author, version, about = "Spatial autocorrelation of origin-destination flows", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vector Moran's I for flows read from a file
    Moran {
        /// Input file: id, origin_x, origin_y, dest_x, dest_y per line
        input: PathBuf,
        #[command(flatten)]
        options: MoranOptions,
    },
    /// Vector Moran's I on the built-in six-flow reference dataset
    Demo {
        #[command(flatten)]
        options: MoranOptions,
    },
}

#[derive(Args)]
struct MoranOptions {
    /// Endpoint locating each flow: origin, destination, both
    #[arg(short, long, default_value = "origin")]
    anchor: String,
    /// Inverse-distance exponent
    #[arg(short, long, default_value = "-1.5", allow_hyphen_values = true)]
    exponent: f64,
    /// Distance beyond which pairs get zero weight (default: connect all)
    #[arg(long)]
    threshold: Option<f64>,
    /// Weights transform: B, R, D, U, V
    #[arg(short, long, default_value = "R")]
    transform: String,
    /// Number of random permutations (0 disables). Ctrl-C stops early and
    /// reports the permutations completed so far.
    #[arg(short, long, default_value = "999")]
    permutations: usize,
    /// Seed for reproducible permutations
    #[arg(short, long)]
    seed: Option<u64>,
    /// Report one-tailed analytical p-values
    #[arg(long)]
    one_tailed: bool,
    /// Run permutations on a single thread
    #[arg(long, conflicts_with = "threads")]
    sequential: bool,
    /// Worker threads for permutations (default: all cores)
    #[arg(long)]
    threads: Option<usize>,
    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    anchor: Anchor,
    transform: WeightTransform,
    result: VectorMoranResult,
}

// ─── Helpers ────────────────────────────────────────────────────────────

const REFERENCE_FLOWS: [(u64, f64, f64, f64, f64); 6] = [
    (1, 55.0, 60.0, 100.0, 500.0),
    (2, 60.0, 55.0, 105.0, 501.0),
    (3, 500.0, 55.0, 155.0, 500.0),
    (4, 505.0, 60.0, 160.0, 500.0),
    (5, 105.0, 950.0, 105.0, 500.0),
    (6, 155.0, 950.0, 155.0, 499.0),
];

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn permutation_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} permutations ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

fn read_flows(path: &PathBuf) -> Result<VectorSample> {
    let pb = spinner("Reading flows...");
    let sample = read_vectors(path).context("Failed to read flow vectors")?;
    pb.finish_and_clear();
    info!("Input: {} flows", sample.len());
    Ok(sample)
}

fn parse_anchors(s: &str) -> Result<Vec<Anchor>> {
    match s.to_lowercase().as_str() {
        "origin" | "o" => Ok(vec![Anchor::Origin]),
        "destination" | "dest" | "d" => Ok(vec![Anchor::Destination]),
        "both" | "od" => Ok(vec![Anchor::Origin, Anchor::Destination]),
        _ => anyhow::bail!("Unknown anchor: {}. Use origin, destination, or both.", s),
    }
}

/// Token cancelled by the first Ctrl-C; a second one exits immediately
fn interrupt_token() -> Result<CancelToken> {
    let token = CancelToken::new();
    signal_hook::flag::register_conditional_shutdown(signal_hook::consts::SIGINT, 130, token.flag())
        .context("Failed to install interrupt handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, token.flag())
        .context("Failed to install interrupt handler")?;
    Ok(token)
}

fn processing_mode(options: &MoranOptions) -> ProcessingMode {
    match (options.sequential, options.threads) {
        (true, _) => ProcessingMode::Sequential,
        (false, Some(threads)) => ProcessingMode::ParallelWith(threads),
        (false, None) => ProcessingMode::Parallel,
    }
}

fn anchor_label(anchor: Anchor) -> &'static str {
    match anchor {
        Anchor::Origin => "origin",
        Anchor::Destination => "destination",
    }
}

fn run(sample: &VectorSample, options: &MoranOptions, cancel: &CancelToken) -> Result<()> {
    let anchors = parse_anchors(&options.anchor)?;
    let transform: WeightTransform = options
        .transform
        .parse()
        .context("Invalid transform")?;
    let mode = processing_mode(options);
    if mode != ProcessingMode::Sequential && options.permutations > 0 {
        debug!("Permutations on {} threads", num_threads());
    }

    let mut reports = Vec::with_capacity(anchors.len());
    for anchor in anchors {
        if cancel.is_cancelled() {
            warn!("Interrupted, skipping {}-anchored statistic", anchor_label(anchor));
            continue;
        }
        let weights = DenseWeights::inverse_distance(
            &sample.anchor_points(anchor),
            &InverseDistanceParams {
                exponent: options.exponent,
                threshold: options.threshold,
                transform,
            },
        )
        .context("Failed to build spatial weights")?;

        let params = MoranParams {
            permutations: options.permutations,
            two_tailed: !options.one_tailed,
            seed: options.seed,
            mode,
        };

        let pb = permutation_bar(options.permutations);
        let start = Instant::now();
        let result = vector_morans_i_with_control(sample, &weights, params, cancel, |done| {
            pb.set_position(done as u64)
        })
        .with_context(|| format!("Failed to compute {}-anchored Moran's I", anchor_label(anchor)))?;
        pb.finish_and_clear();
        info!("{}-anchored statistic in {:.2?}", anchor_label(anchor), start.elapsed());

        reports.push(Report {
            anchor,
            transform,
            result,
        });
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }
    Ok(())
}

fn print_report(report: &Report) {
    let r = &report.result;
    let tails = if r.two_tailed { "two-tailed" } else { "one-tailed" };
    println!(
        "Vector Moran's I ({}-anchored, {} weights, n = {})",
        anchor_label(report.anchor),
        report.transform,
        r.n
    );
    println!("  I:    {:.6}", r.i);
    println!("  E[I]: {:.6}", r.ei);
    println!(
        "  Normality:     VI = {:.6}  se = {:.6}  z = {:.4}  p = {:.4} ({})",
        r.vi_norm, r.se_i_norm, r.z_norm, r.p_norm, tails
    );
    println!(
        "  Randomization: VI = {:.6}  se = {:.6}  z = {:.4}  p = {:.4} ({})",
        r.vi_rand, r.se_i_rand, r.z_rand, r.p_rand, tails
    );
    if let Some(sim) = &r.simulation {
        let runs = match sim.status {
            PermutationStatus::Complete => format!("{}", sim.permutations),
            PermutationStatus::Cancelled { completed } => {
                format!("{} of {}, cancelled", completed, sim.permutations)
            }
        };
        println!(
            "  Permutations ({}): E[I] = {:.6}  VI = {:.6}  z = {:.4}  p_sim = {:.4}  p_z_sim = {:.4}",
            runs, sim.ei_sim, sim.vi_sim, sim.z_sim, sim.p_sim, sim.p_z_sim
        );
    }
    println!();
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let cancel = interrupt_token()?;

    match cli.command {
        Commands::Moran { input, options } => {
            let sample = read_flows(&input)?;
            run(&sample, &options, &cancel)?;
        }
        Commands::Demo { options } => {
            let sample = VectorSample::from_tuples(&REFERENCE_FLOWS)
                .context("Failed to build reference flows")?;
            run(&sample, &options, &cancel)?;
        }
    }

    Ok(())
}
