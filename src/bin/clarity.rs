use clap::{Args, Parser, Subcommand};
use clarity::config::Config;
use clarity::ingest::{self, IngestReport};
use clarity::monitor::Sentinel;
use clarity::{summarizer, trend};
use chrono::SecondsFormat;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries JSON results; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "clarity", version, about = "Log timeline normalization and trend detection")]
struct Cli {
    /// TOML configuration file (falls back to $CLARITY_CONFIG, then defaults)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the merged timeline as JSON lines
    Timeline(Inputs),
    /// Root-cause report for a past incident (local analysis)
    Analyze(Inputs),
    /// Run trend detection once and print the alerts
    Scan(ScanArgs),
    /// Scan repeatedly until interrupted
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
struct Inputs {
    /// Log files (.json, .csv, .log, .txt)
    #[arg(required = true)]
    input: Vec<PathBuf>,
    /// Per-file read timeout in seconds
    #[arg(long = "file-timeout")]
    file_timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct ThresholdArgs {
    #[arg(long = "error-threshold")] error_threshold: Option<f64>,
    #[arg(long = "error-high-threshold")] error_high_threshold: Option<f64>,
    #[arg(long = "error-window")] error_window: Option<i64>,
    #[arg(long = "latency-threshold-ms")] latency_threshold_ms: Option<f64>,
    #[arg(long = "latency-window")] latency_window: Option<i64>,
    /// Only consider this source (path or file name) for latency checks
    #[arg(long = "latency-source")] latency_source: Option<String>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    inputs: Inputs,
    #[command(flatten)]
    thresholds: ThresholdArgs,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[command(flatten)]
    inputs: Inputs,
    #[command(flatten)]
    thresholds: ThresholdArgs,
    /// Seconds between scans
    #[arg(long = "interval")]
    interval_secs: Option<u64>,
}

fn apply_inputs(cfg: &mut Config, inputs: &Inputs) {
    if let Some(t) = inputs.file_timeout { cfg.ingest.file_timeout_secs = t; }
}

fn apply_thresholds(cfg: &mut Config, t: &ThresholdArgs) {
    if let Some(v) = t.error_threshold { cfg.trend.error_rate_threshold = v; }
    if let Some(v) = t.error_high_threshold { cfg.trend.error_rate_high_threshold = v; }
    if let Some(v) = t.error_window { cfg.trend.error_window_minutes = Some(v); }
    if let Some(v) = t.latency_threshold_ms { cfg.trend.latency_threshold_ms = v; }
    if let Some(v) = t.latency_window { cfg.trend.latency_window_minutes = v; }
    if let Some(v) = t.latency_source.as_ref() { cfg.trend.latency_source = Some(v.clone()); }
}

fn report_warnings(report: &IngestReport) {
    if report.is_partial() {
        eprintln!(
            "[clarity] partial result: {} failed files, {} skipped records, {} events without timestamp",
            report.failures.len(),
            report.skipped_records,
            report.dropped_untimed
        );
        for f in &report.failures {
            eprintln!("[clarity]   {}: {}", f.path, f.reason);
        }
    }
}

/// Grace period for blocking readers when the runtime goes down. Readers
/// that overran their per-file timeout are still parked here and are left
/// behind rather than awaited.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    init_logging();
    init_parallelism();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let outcome = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    outcome
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Timeline(inputs) => {
            apply_inputs(&mut cfg, &inputs);
            cfg.validate()?;
            let report = ingest::load_files_bounded(&inputs.input, &cfg.ingest).await;
            report_warnings(&report);
            for e in report.timeline.iter() {
                println!("{}", serde_json::to_string(e)?);
            }
        }
        Command::Analyze(inputs) => {
            apply_inputs(&mut cfg, &inputs);
            cfg.validate()?;
            let report = ingest::load_files_bounded(&inputs.input, &cfg.ingest).await;
            report_warnings(&report);
            if report.timeline.is_empty() {
                anyhow::bail!("could not parse any valid log entries from the provided files");
            }
            let rca = summarizer::analyze_incident(&report.timeline, None, &cfg.summarizer).await;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "events": report.timeline.len(),
                "start": report.timeline.first_timestamp().map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                "end": report.timeline.last_timestamp().map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                "warnings": report.warning_count(),
                "analysis": rca,
            }))?);
        }
        Command::Scan(args) => {
            apply_inputs(&mut cfg, &args.inputs);
            apply_thresholds(&mut cfg, &args.thresholds);
            cfg.validate()?;
            let report = ingest::load_files_bounded(&args.inputs.input, &cfg.ingest).await;
            report_warnings(&report);
            let alerts = trend::detect(&report.timeline, &cfg.trend);
            let latency = trend::find_latency_anomaly(&report.timeline, &cfg.trend);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "events": report.timeline.len(),
                "warnings": report.warning_count(),
                "error_ratio": trend::error_ratio(report.timeline.events()),
                "latency": latency.map(|l| l.description()),
                "alerts": alerts,
            }))?);
        }
        Command::Monitor(args) => {
            apply_inputs(&mut cfg, &args.inputs);
            apply_thresholds(&mut cfg, &args.thresholds);
            if let Some(i) = args.interval_secs { cfg.monitor.interval_secs = i; }
            cfg.validate()?;
            let (tx, rx) = tokio::sync::watch::channel(false);
            ctrlc::set_handler(move || { let _ = tx.send(true); })?;
            let sentinel = Sentinel::new(args.inputs.input, cfg, rx);
            sentinel
                .run(|result| {
                    eprintln!(
                        "[clarity] scan #{} status={:?} events={} alerts={}",
                        result.scan_number,
                        result.status,
                        result.events_processed,
                        result.alerts.len()
                    );
                    if let Ok(s) = serde_json::to_string(result) {
                        println!("{s}");
                    }
                })
                .await;
        }
    }
    Ok(())
}
