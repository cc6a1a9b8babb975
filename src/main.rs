use agent_watchdog::calibrate::{calibrate_report, CalibrationOptions};
use agent_watchdog::config::{load_config, WatchdogConfig};
use agent_watchdog::{FirstSegment, LabeledRun, Objective, Thresholds, Watchdog};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Audit an agent's action log for zombie loops, or fit the kill threshold
/// from labeled historical runs.
#[derive(Parser, Debug)]
#[command(name = "agent-watchdog", version, about)]
pub struct Cli {
    /// Config file path (missing file means defaults)
    #[arg(short, long, default_value = "watchdog.toml", global = true)]
    config: PathBuf,

    /// Extra logging (per-audit and per-candidate detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score an action log (one action per line) and print its status
    Audit {
        /// Action log file
        file: PathBuf,

        /// Score the whole log instead of the trailing window
        #[arg(long)]
        global: bool,

        /// Kill threshold (overrides config)
        #[arg(long)]
        kill_threshold: Option<f64>,

        /// Amber threshold (overrides config)
        #[arg(long)]
        amber_threshold: Option<f64>,

        /// Window size (overrides config)
        #[arg(short, long)]
        window: Option<usize>,

        /// Exit with status 2 when the run is RED
        #[arg(long)]
        fail_on_red: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fit a kill threshold from a JSONL corpus of {"actions": [...], "success": bool}
    Calibrate {
        /// Labeled corpus file
        corpus: PathBuf,

        /// Window size (overrides config)
        #[arg(short, long)]
        window: Option<usize>,

        /// Scoring objective: accuracy, f1, or avoid-killing-winners (overrides config)
        #[arg(long, value_parser = parse_objective)]
        objective: Option<Objective>,

        /// Minimum number of runs (overrides config)
        #[arg(long)]
        min_runs: Option<usize>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let result = load_config(&cli.config)
        .map_err(|e| format!("Failed to load config: {e}"))
        .and_then(|mut config| match cli.command {
            Command::Audit {
                file,
                global,
                kill_threshold,
                amber_threshold,
                window,
                fail_on_red,
                json,
            } => {
                if let Some(kill) = kill_threshold {
                    config.kill_threshold = kill;
                    // A new kill threshold re-derives amber unless both are given.
                    config.amber_threshold = amber_threshold;
                } else if amber_threshold.is_some() {
                    config.amber_threshold = amber_threshold;
                }
                if let Some(w) = window {
                    config.window_size = w;
                }
                handle_audit(&config, &file, !global, json).map(|red| {
                    if red && fail_on_red {
                        std::process::exit(2);
                    }
                })
            }
            Command::Calibrate {
                corpus,
                window,
                objective,
                min_runs,
                json,
            } => {
                let mut options = config.calibration_options();
                if let Some(w) = window {
                    options.window_size = w;
                }
                if let Some(o) = objective {
                    options.objective = o;
                }
                if let Some(m) = min_runs {
                    options.min_runs = m;
                }
                handle_calibrate(&options, &corpus, json)
            }
        });

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Handle the `audit` subcommand. Returns whether the run is RED.
fn handle_audit(
    config: &WatchdogConfig,
    path: &Path,
    use_window: bool,
    json: bool,
) -> Result<bool, String> {
    let mut dog = Watchdog::new(config).map_err(|e| format!("Invalid configuration: {e}"))?;

    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    for line in std::io::BufReader::new(file).lines() {
        let line = line.map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        dog.log_action(line)
            .map_err(|e| format!("Failed to log action: {e}"))?;
    }

    let result = dog.audit(use_window);
    if json {
        let out = serde_json::to_string_pretty(&result)
            .map_err(|e| format!("Failed to serialize result: {e}"))?;
        println!("{out}");
    } else {
        println!("{}  {}", result.status, result.recommendation);
        println!("freshness  {}", result.freshness);
        println!("burn rate  {:.3}", result.burn_rate);
        println!(
            "thresholds kill {:.3} / amber {:.3}",
            result.thresholds.kill(),
            result.thresholds.amber()
        );
        if result.warming_up {
            println!("(warming up: fewer than {} actions scored)", config.min_steps);
        }
    }

    Ok(result.status == agent_watchdog::Status::Red)
}

/// Map an `--objective` value onto the library enum.
fn parse_objective(value: &str) -> Result<Objective, String> {
    match value.to_ascii_lowercase().replace('-', "_").as_str() {
        "accuracy" => Ok(Objective::Accuracy),
        "f1" => Ok(Objective::F1),
        "avoid_killing_winners" => Ok(Objective::AvoidKillingWinners),
        other => Err(format!(
            "unknown objective '{other}' (expected accuracy, f1, or avoid-killing-winners)"
        )),
    }
}

/// Handle the `calibrate` subcommand.
fn handle_calibrate(options: &CalibrationOptions, path: &Path, json: bool) -> Result<(), String> {
    let runs = read_corpus(path)?;
    let report = calibrate_report(&runs, options, &FirstSegment)
        .map_err(|e| format!("Calibration failed: {e}"))?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{out}");
        return Ok(());
    }

    // Reject a fit that could not be fed back into the classifier.
    let thresholds = Thresholds::new(report.threshold, None)
        .map_err(|e| format!("Calibrated threshold unusable: {e}"))?;

    let c = &report.confusion;
    println!("kill_threshold = {:.4}", report.threshold);
    println!("amber_threshold = {:.4}  (derived)", thresholds.amber());
    println!(
        "{:?} score {:.3} over {} runs (window {})",
        options.objective,
        report.score,
        c.total(),
        options.window_size
    );
    println!("{:<10} {:>8} {:>8}", "", "KILLED", "SPARED");
    println!(
        "{:<10} {:>8} {:>8}",
        "failed", c.killed_failures, c.spared_failures
    );
    println!(
        "{:<10} {:>8} {:>8}",
        "succeeded", c.killed_successes, c.spared_successes
    );
    Ok(())
}

/// Read a JSONL corpus of labeled runs, skipping blank lines.
fn read_corpus(path: &Path) -> Result<Vec<LabeledRun>, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;

    let mut runs = Vec::new();
    for (idx, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let run: LabeledRun = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: invalid labeled run: {e}", path.display(), idx + 1))?;
        runs.push(run);
    }
    Ok(runs)
}
