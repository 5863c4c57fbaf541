//! Degradation Proxy - utilization-shaped latency and failure injection
//!
//! Drives synthetic load through a configured degradation handler and
//! reports how the calls ended.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use degradation_proxy::{
    cli::{Cli, Command, OutputFormat},
    config::Config,
    naming::GroupSequence,
    setup_tracing,
    simulate::{self, PlanSummary},
    stats::StatsSnapshot,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            eprintln!("❌ {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Simulate {
            calls,
            concurrency,
            operation,
            format,
        } => run_simulate(&config, calls, concurrency, &operation, format).await,
        Command::Plan {
            utilization,
            samples,
            format,
        } => run_plan(&config, utilization, samples, format),
        Command::CheckConfig => {
            println!("✅ Configuration is valid");
            println!("   Pass rate: {}", config.strategy.pass_rate);
            println!("   Pool capacity: {}", config.handler.pool_capacity);
            println!("   Schedules: {}", config.schedules.len());
            ExitCode::SUCCESS
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load {}", p.display()),
        None => "Failed to load configuration from environment".to_string(),
    })
}

/// Run synthetic load through a handler built from the configuration
async fn run_simulate(
    config: &Config,
    calls: usize,
    concurrency: usize,
    operation: &str,
    format: OutputFormat,
) -> ExitCode {
    let handler = match simulate::handler_from_config(config, &GroupSequence::new()) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("❌ Failed to start worker pool: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        pool_capacity = handler.pool_capacity(),
        "Degradation handler ready"
    );

    let snapshot = simulate::run_load(&handler, operation, calls, concurrency).await;

    match format {
        OutputFormat::Json => print_json(&snapshot),
        OutputFormat::Text => {
            print_snapshot(&snapshot);
            ExitCode::SUCCESS
        }
    }
}

/// Sample plans from the configured strategy
fn run_plan(config: &Config, utilization: f64, samples: usize, format: OutputFormat) -> ExitCode {
    if !(0.0..=1.0).contains(&utilization) {
        eprintln!("❌ Utilization must be within [0, 1], got {utilization}");
        return ExitCode::FAILURE;
    }

    let strategy = simulate::strategy_from_config(config);
    let summary = simulate::sample_plans(strategy.as_ref(), utilization, samples);

    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to serialize to JSON: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_snapshot(snapshot: &StatsSnapshot) {
    println!("📊 {} call(s)\n", snapshot.total);
    println!("   Passed:        {}", snapshot.passed);
    println!("   Bypassed:      {}", snapshot.bypassed);
    println!("   Injected:      {}", snapshot.injected);
    println!("   Canned:        {}", snapshot.canned);
    println!("   Timed out:     {}", snapshot.timed_out);
    println!("   Target failed: {}", snapshot.target_failed);
    println!("   Pass ratio:    {:.3}", snapshot.pass_ratio);

    if let (Some(p50), Some(p95), Some(p99)) = (
        snapshot.latency_p50_ms,
        snapshot.latency_p95_ms,
        snapshot.latency_p99_ms,
    ) {
        println!("   Latency:       p50 {p50}ms, p95 {p95}ms, p99 {p99}ms");
    }
}

fn print_summary(summary: &PlanSummary) {
    println!(
        "📈 {} plan(s) at utilization {:.2}\n",
        summary.samples, summary.utilization
    );
    println!(
        "   Failures:      {} ({:.1}%)",
        summary.failures,
        summary.failure_ratio * 100.0
    );
    println!("   Fast failures: {}", summary.fast_failures);
    println!(
        "   Delay:         min {:.1}ms, mean {:.1}ms, max {:.1}ms",
        summary.delay_min_ms, summary.delay_mean_ms, summary.delay_max_ms
    );
}
