//! TraceSim CLI
//!
//! Run deterministic scenarios against the traceability engine, or drive
//! the real engine on tokio time with `--live`.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracesim_core::{EngineConfig, Registry, Snapshot, TraceEngine};
use tracesim_env::TokioContext;
use tracesim_sim::scenarios::ScenarioId;
use tracesim_sim::{duration_from_secs, ScenarioResult, ScenarioRunner, SimError, SimExport};
use tracing::{debug, error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// TraceSim deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "tracesim")]
#[command(about = "Run deterministic simulation scenarios for the traceability engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady_state, pause_resume, failover, latency_storm, empty_registry, dangling_refs, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds (wall-clock seconds with --live)
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-step snapshots of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Run the real engine on tokio time and log every snapshot
    #[arg(long)]
    live: bool,

    /// JSON file overriding engine configuration fields
    #[arg(long)]
    config: Option<String>,

    /// JSON file replacing the built-in sample registry
    #[arg(long)]
    registry: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let code = match run(&args) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!("{}", e);
            2
        }
    };
    std::process::exit(code);
}

fn run(args: &Args) -> Result<bool, SimError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    let registry = match &args.registry {
        Some(path) => Some(Registry::from_json(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let duration = duration_from_secs(args.duration)?;

    if args.live {
        return run_live(config, registry.unwrap_or_else(Registry::sample), duration);
    }

    if !args.json {
        info!("TraceSim DST v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args
            .scenario
            .parse()
            .map_err(|_| SimError::UnknownScenario(args.scenario.clone()))?]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        let runner = ScenarioRunner::new(seed)
            .with_duration(duration)
            .with_config(config.clone());
        match &registry {
            Some(r) => runner.with_registry(r.clone()),
            None => runner,
        }
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::Usage(
                "--export only supports a single scenario, not 'all'".to_string(),
            ));
        }
        let scenario = scenarios[0];
        info!("Running with export to: {}", export_path);

        let mut export = SimExport::new(scenario.name(), base_seed);
        let result = runner_for(base_seed)
            .run_observed(scenario, &mut |world| export.capture(world))?;
        export.finalize(result.passed, result.failure_reason.clone());
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        report(&result);
        return Ok(result.passed);
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario)?;
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.total_steps,
                    "time_secs": r.final_time_secs,
                    "metrics_ticks": r.metrics.metrics_ticks,
                    "skipped_ticks": r.metrics.skipped_ticks,
                    "active_ticks": r.metrics.active_ticks,
                    "peak_anomalies": r.metrics.peak_anomalies,
                    "peak_latency_ms": r.metrics.peak_latency_ms,
                    "violations": r.violations,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed.is_empty())
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | ticks={} skipped={} active={} peak_anomalies={}",
            result.scenario.name(),
            result.seed,
            result.metrics.metrics_ticks,
            result.metrics.skipped_ticks,
            result.metrics.active_ticks,
            result.metrics.peak_anomalies
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

/// Drives the real engine on tokio time for `duration` of wall-clock time.
fn run_live(config: EngineConfig, registry: Registry, duration: Duration) -> Result<bool, SimError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let engine = TraceEngine::create(TokioContext::shared(), registry, config)?;
        let mut rx = engine.subscribe();
        info!("Live engine started for {:.1}s", duration.as_secs_f64());

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = Arc::clone(&*rx.borrow_and_update());
                    log_snapshot(&snapshot);
                }
            }
        }

        engine.dispose().await?;
        info!("Live engine stopped");
        Ok::<bool, SimError>(true)
    })
}

fn log_snapshot(snapshot: &Snapshot) {
    let rollup = &snapshot.derived.rollup;
    info!(
        state = %snapshot.state,
        ticks = snapshot.metrics_ticks,
        active = rollup.active_flow_count,
        issues = rollup.issue_count,
        anomalies = rollup.anomaly_count,
        encrypted_pct = rollup.encrypted_sensitive_pct.round(),
        gdpr_pct = rollup.gdpr_covered_pct.round(),
        "snapshot"
    );
    for anomaly in &snapshot.derived.anomalies {
        debug!(flow = %anomaly.flow_id, severity = ?anomaly.severity, "{}", anomaly.reason);
    }
}
