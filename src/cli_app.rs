//! Top-level CLI definition and dispatch.
//!
//! The dispatcher is the only place where typed outcomes become process
//! exit codes; every subcommand handler returns `Result` and the stable
//! exit contract is applied once, at the bottom.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use labops::agent::stop::StopConfig;
use labops::agent::triage::{TriageOptions, run_triage_session};
use labops::artifacts::diff_writer::{write_metrics_diff_json, write_metrics_diff_markdown};
use labops::artifacts::kb::write_kb_draft;
use labops::backends::webcam::enumerate_devices;
use labops::core::errors::{ExitCode, LabOpsError, Result};
use labops::metrics::diff::compute_metrics_diff_from_csv;
use labops::run::{RunOptions, RunStatus, execute_scenario_run};
use labops::scenario::{BackendKind, load_scenario_file};
use labops::soak::{SoakOptions, SoakOutcome, execute_soak_run};

/// LabOps — camera-lab triage toolkit.
#[derive(Debug, Parser)]
#[command(
    name = "labops",
    author,
    version,
    about = "Camera-lab triage: deterministic scenario runs, OAAT sweeps, engineer handoff bundles",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Print version information.
    Version,
    /// Validate a scenario file without running it.
    Validate(ValidateArgs),
    /// Execute one scenario and emit its bundle.
    Run(RunArgs),
    /// Baseline management.
    Baseline(BaselineArgs),
    /// Compare a run bundle against a baseline bundle.
    Compare(CompareArgs),
    /// Enumerate devices visible to a backend.
    ListDevices(ListDevicesArgs),
    /// Knowledge-base helpers.
    Kb(KbArgs),
    /// Run an automated triage session for a symptom.
    Triage(TriageArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Args)]
struct ValidateArgs {
    /// Scenario file to validate.
    scenario: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Scenario file to run.
    scenario: PathBuf,
    /// Output root for the run bundle.
    #[arg(long, value_name = "DIR", default_value = "out")]
    out: PathBuf,
    /// Package the finished bundle as bundle.zip.
    #[arg(long)]
    zip: bool,
    /// Log verbosity for stderr progress lines.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// Execute in checkpointed soak mode.
    #[arg(long)]
    soak: bool,
    /// Checkpoint slice length in milliseconds (soak mode).
    #[arg(long, value_name = "INT", requires = "soak")]
    checkpoint_interval_ms: Option<u64>,
    /// Resume a paused soak run from its checkpoint.
    #[arg(long, value_name = "CHECKPOINT", requires = "soak")]
    resume: Option<PathBuf>,
    /// Pause the soak run when this file appears.
    #[arg(long, value_name = "PATH", requires = "soak")]
    soak_stop_file: Option<PathBuf>,
    /// Render manual netem commands into the summary.
    #[arg(long, requires = "netem_iface")]
    apply_netem: bool,
    /// Interface named in the netem command block.
    #[arg(long, value_name = "NAME")]
    netem_iface: Option<String>,
    /// Capture the backend SDK trace as sdk_log.txt.
    #[arg(long)]
    sdk_log: bool,
}

#[derive(Debug, Clone, Args)]
struct BaselineArgs {
    #[command(subcommand)]
    command: BaselineCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum BaselineCommand {
    /// Run a scenario into the stable baseline directory.
    Capture(BaselineCaptureArgs),
}

#[derive(Debug, Clone, Args)]
struct BaselineCaptureArgs {
    /// Scenario file to capture as a baseline.
    scenario: PathBuf,
    /// Output root (the bundle lands under baselines/<scenario_id>/).
    #[arg(long, value_name = "DIR", default_value = "out")]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct CompareArgs {
    /// Baseline bundle directory.
    #[arg(long, value_name = "DIR")]
    baseline: PathBuf,
    /// Run bundle directory (receives diff.json / diff.md).
    #[arg(long, value_name = "DIR")]
    run: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ListDevicesArgs {
    /// Backend to enumerate.
    #[arg(long, value_name = "NAME")]
    backend: String,
}

#[derive(Debug, Clone, Args)]
struct KbArgs {
    #[command(subcommand)]
    command: KbCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum KbCommand {
    /// Draft a knowledge-base article from a run bundle.
    Draft(KbDraftArgs),
}

#[derive(Debug, Clone, Args)]
struct KbDraftArgs {
    /// Run bundle directory.
    #[arg(long, value_name = "DIR")]
    run: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct TriageArgs {
    /// Known-good base scenario.
    scenario: PathBuf,
    /// Symptom to triage (e.g. dropped_frames).
    #[arg(long, value_name = "NAME")]
    symptom: String,
    /// Output root for baselines, variants, runs, and the packet.
    #[arg(long, value_name = "DIR", default_value = "out")]
    out: PathBuf,
    /// Hard cap on results-table rows before the session stops.
    #[arg(long, value_name = "INT", default_value_t = 12)]
    max_runs: usize,
}

fn print_status_line(passed: bool, bundle_dir: &std::path::Path) {
    let label = if passed {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    eprintln!("labops: {label} bundle={}", bundle_dir.display());
}

fn command_validate(args: &ValidateArgs) -> Result<()> {
    let scenario = load_scenario_file(&args.scenario)?;
    println!(
        "valid: {} (scenario_id={}, backend={})",
        args.scenario.display(),
        scenario.scenario_id,
        scenario.backend.as_str()
    );
    Ok(())
}

fn command_run(args: &RunArgs) -> Result<ExitCode> {
    let mut options = RunOptions::new(&args.scenario, &args.out);
    options.zip_bundle = args.zip;
    options.sdk_log = args.sdk_log;
    if args.apply_netem {
        options.netem_interface = args.netem_iface.clone();
    }

    if args.soak {
        let soak = SoakOptions {
            checkpoint_interval_ms: args.checkpoint_interval_ms,
            resume_checkpoint: args.resume.clone(),
            stop_file: args.soak_stop_file.clone(),
        };
        return match execute_soak_run(&options, &soak)? {
            SoakOutcome::Completed(outcome) => {
                let passed = outcome.status.passed();
                print_status_line(passed, &outcome.bundle_dir);
                Ok(if passed {
                    ExitCode::Success
                } else {
                    ExitCode::ThresholdsFailed
                })
            }
            SoakOutcome::Paused {
                checkpoint_path,
                stop_reason,
                ..
            } => {
                eprintln!(
                    "labops: soak run paused ({stop_reason}); resume with --resume {}",
                    checkpoint_path.display()
                );
                Ok(if stop_reason == "signal_interrupt" {
                    ExitCode::Failure
                } else {
                    ExitCode::Success
                })
            }
        };
    }

    let outcome = execute_scenario_run(&options)?;
    if args.log_level == LogLevel::Debug {
        eprintln!(
            "labops: run {} frames_total={} avg_fps={:.3}",
            outcome.run_id, outcome.report.frames_total, outcome.report.avg_fps
        );
    }
    match &outcome.status {
        RunStatus::Passed => {
            print_status_line(true, &outcome.bundle_dir);
            Ok(ExitCode::Success)
        }
        RunStatus::ThresholdsFailed { violations } => {
            print_status_line(false, &outcome.bundle_dir);
            for violation in violations {
                eprintln!("labops: threshold violation: {violation}");
            }
            Ok(ExitCode::ThresholdsFailed)
        }
    }
}

fn command_baseline_capture(args: &BaselineCaptureArgs) -> Result<ExitCode> {
    let scenario = load_scenario_file(&args.scenario)?;
    let mut options = RunOptions::new(
        &args.scenario,
        args.out.join("baselines").join(&scenario.scenario_id),
    );
    options.use_per_run_bundle_dir = false;
    let outcome = execute_scenario_run(&options)?;
    println!("baseline captured: {}", outcome.bundle_dir.display());
    match outcome.status {
        RunStatus::Passed => Ok(ExitCode::Success),
        RunStatus::ThresholdsFailed { .. } => {
            print_status_line(false, &outcome.bundle_dir);
            Ok(ExitCode::ThresholdsFailed)
        }
    }
}

fn command_compare(args: &CompareArgs) -> Result<()> {
    let baseline_csv = args.baseline.join("metrics.csv");
    let run_csv = args.run.join("metrics.csv");
    let report = compute_metrics_diff_from_csv(&baseline_csv, &run_csv)?;
    let diff_json = write_metrics_diff_json(&report, &args.run)?;
    let diff_md = write_metrics_diff_markdown(&report, &args.run)?;
    let (increased, decreased, unchanged) = report.change_summary();
    println!(
        "compared {} metrics (increased={increased}, decreased={decreased}, unchanged={unchanged})",
        report.deltas.len()
    );
    println!("wrote {} and {}", diff_json.display(), diff_md.display());
    Ok(())
}

fn command_list_devices(args: &ListDevicesArgs) -> Result<()> {
    let kind = BackendKind::parse(&args.backend).map_err(|_| LabOpsError::Usage {
        details: format!(
            "unknown backend '{}' (expected sim, webcam, real, sdk_stub)",
            args.backend
        ),
    })?;
    match kind {
        BackendKind::Sim => {
            println!("sim:0 deterministic-sim-camera (always available)");
        }
        BackendKind::Webcam => {
            let devices = enumerate_devices()?;
            if devices.is_empty() {
                println!("no webcam devices discovered");
            }
            for (index, device) in devices.iter().enumerate() {
                match &device.bus_info {
                    Some(bus) => println!(
                        "webcam:{index} {} ({}) bus={bus}",
                        device.device_id, device.friendly_name
                    ),
                    None => println!(
                        "webcam:{index} {} ({})",
                        device.device_id, device.friendly_name
                    ),
                }
            }
        }
        BackendKind::Real | BackendKind::SdkStub => {
            println!(
                "no enumerable devices for backend '{}' (SDK adapter not linked)",
                kind.as_str()
            );
        }
    }
    Ok(())
}

fn command_triage(args: &TriageArgs) -> Result<ExitCode> {
    let outcome = run_triage_session(&TriageOptions {
        base_scenario_path: args.scenario.clone(),
        symptom: args.symptom.clone(),
        output_root: args.out.clone(),
        stop_config: StopConfig {
            max_runs: args.max_runs,
            ..StopConfig::default()
        },
        lock_path: None,
        interrupt: None,
    })?;
    println!(
        "triage session {} stopped: {} ({} attempts)",
        outcome.session_id,
        outcome.stop_decision.reason.as_str(),
        outcome.attempts
    );
    println!("engineer packet: {}", outcome.packet_path.display());
    if outcome.interrupted {
        return Ok(ExitCode::Failure);
    }
    Ok(ExitCode::Success)
}

/// Dispatches a parsed CLI invocation. Returns the process exit code.
#[must_use]
pub fn run(cli: &Cli) -> i32 {
    let result: Result<ExitCode> = match &cli.command {
        Command::Version => {
            println!("labops {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::Success)
        }
        Command::Validate(args) => command_validate(args).map(|()| ExitCode::Success),
        Command::Run(args) => command_run(args),
        Command::Baseline(args) => match &args.command {
            BaselineCommand::Capture(capture) => command_baseline_capture(capture),
        },
        Command::Compare(args) => command_compare(args).map(|()| ExitCode::Success),
        Command::ListDevices(args) => command_list_devices(args).map(|()| ExitCode::Success),
        Command::Kb(args) => match &args.command {
            KbCommand::Draft(draft) => write_kb_draft(&draft.run).map(|path| {
                println!("kb draft: {}", path.display());
                ExitCode::Success
            }),
        },
        Command::Triage(args) => command_triage(args),
    };

    match result {
        Ok(code) => code.as_i32(),
        Err(error) => {
            eprintln!("labops: {error}");
            error.exit_code().as_i32()
        }
    }
}
