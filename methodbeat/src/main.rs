//! # methodbeat - Main Entry Point
//!
//! Runs a synthetic workload on a single-threaded work loop with the tracer
//! attached, then reports every call that crossed the evil-method threshold.
//!
//! - **Text report** (default): per-call list and per-method summary
//! - **JSON report** (`--json`): the same data for scripts

// Main function is intentionally long for clarity; time conversions lose precision for display
#![allow(clippy::too_many_lines, clippy::cast_precision_loss)]

mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, Instant};

use methodbeat::analysis::{EvilMethod, EvilMethodStats, MethodSummary};
use methodbeat::cli::Args;
use methodbeat::domain::{ConfigError, TracerError};
use methodbeat::{LoopMonitor, MethodBeat, TracerConfig, WorkLoop};
use workload::{method_name, JobReport, Workload};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let bad_config = err.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || matches!(cause.downcast_ref::<TracerError>(), Some(TracerError::Config(_)))
    });
    if bad_config {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Load `--config` if given, then apply command-line overrides.
fn load_config(args: &Args) -> Result<TracerConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config: {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => TracerConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid tracer configuration")?;
    Ok(config)
}

#[derive(Debug, Serialize)]
struct Report {
    exit_reason: &'static str,
    elapsed_ms: u128,
    status: String,
    threshold_ms: u64,
    jobs_posted: u64,
    jobs_completed: u64,
    records_analysed: usize,
    evil_methods: Vec<EvilMethod>,
    summaries: Vec<MethodSummary>,
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;
    let mut config = load_config(&args)?;

    // The tracer only records from the loop thread, so the loop comes first.
    let monitor = Arc::new(LoopMonitor::new());
    let mut work_loop = WorkLoop::spawn("methodbeat-loop", Arc::clone(&monitor))
        .context("Failed to spawn work loop thread")?;
    config.loop_thread = Some(work_loop.thread_id());

    let tracer = Arc::new(
        MethodBeat::new(config, monitor.clone()).context("Failed to create tracer")?,
    );
    tracer.start().context("Failed to start tracer")?;

    if !quiet && !args.json {
        println!("methodbeat v{}", env!("CARGO_PKG_VERSION"));
        println!("capacity: {}", tracer.config().buffer_capacity);
        println!("threshold: {}ms", tracer.config().evil_method_threshold_ms);
        println!("loop thread: {}", work_loop.thread_id());
    }

    let workload = Arc::new(Workload::new(Arc::clone(&tracer), args.slow_every));
    let (report_tx, report_rx) = unbounded::<JobReport>();

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let deadline = async {
        match duration_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut tick = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut jobs_posted = 0_u64;
    let mut in_flight = false;
    let mut reports: Vec<JobReport> = Vec::new();
    let exit_reason;

    // One job in flight at a time, like frames on a UI thread
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                exit_reason = "interrupted";
                break;
            }
            () = &mut deadline => {
                exit_reason = "duration limit reached";
                break;
            }
            _ = tick.tick() => {
                for report in report_rx.try_iter() {
                    in_flight = false;
                    if !report.evil.is_empty() {
                        info!("job {} flagged {} slow call(s)", report.job, report.evil.len());
                    }
                    reports.push(report);
                }
                if in_flight {
                    continue;
                }

                let job = jobs_posted;
                let workload = Arc::clone(&workload);
                let tx = report_tx.clone();
                if work_loop.post(move || {
                    let _ = tx.send(workload.run_job(job));
                }) {
                    jobs_posted += 1;
                    in_flight = true;
                }
            }
        }
    }

    work_loop.shutdown();
    drop(report_tx);
    reports.extend(report_rx.try_iter());
    if !tracer.stop() {
        debug!("tracer was not running at shutdown: {}", tracer.status());
    }

    let mut stats = EvilMethodStats::new();
    let mut evil_methods = Vec::new();
    for report in &reports {
        stats.record_all(&report.evil);
        evil_methods.extend(report.evil.iter().cloned());
    }
    evil_methods.sort_by_key(|evil| std::cmp::Reverse(evil.duration_ms));

    let report = Report {
        exit_reason,
        elapsed_ms: started.elapsed().as_millis(),
        status: tracer.status().to_string(),
        threshold_ms: tracer.config().evil_method_threshold_ms,
        jobs_posted,
        jobs_completed: reports.len() as u64,
        records_analysed: reports.iter().map(|r| r.records).sum(),
        evil_methods,
        summaries: stats.to_summaries(),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
        return Ok(());
    }

    print_report(&report, quiet);
    Ok(())
}

fn print_report(report: &Report, quiet: bool) {
    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} jobs ({} completed), {} records analysed, tracer {}",
            report.exit_reason,
            report.elapsed_ms as f64 / 1000.0,
            report.jobs_posted,
            report.jobs_completed,
            report.records_analysed,
            report.status,
        );
    }

    if report.evil_methods.is_empty() {
        println!("no calls over {}ms", report.threshold_ms);
        return;
    }

    println!("\nSLOW CALLS (>= {}ms)", report.threshold_ms);
    for evil in &report.evil_methods {
        println!(
            "  {:>6}ms  {}{} ({})  at +{}ms",
            evil.duration_ms,
            "  ".repeat(evil.depth),
            method_name(evil.method),
            evil.method,
            evil.enter_offset.0,
        );
    }

    println!("\nBY METHOD");
    for summary in &report.summaries {
        println!(
            "  {:<14} {:>4} call(s)  total {:>6}ms  max {:>6}ms  {:>5.1}%",
            method_name(summary.method),
            summary.count,
            summary.total_ms,
            summary.max_ms,
            summary.percentage,
        );
    }
}
