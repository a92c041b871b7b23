//! Handler for the `check` command.

use std::path::Path;

use serde::Serialize;

use crate::adapter::inbound::cli::command::CheckArgs;
use crate::error::Result;
use crate::infrastructure::config::{CircuitBreakerConfig, Config, PoolConfig};

/// Effective configuration as printed by `wsmux check --json`.
#[derive(Debug, Serialize)]
pub struct CheckReport<'a> {
    pub config: String,
    pub upstream: &'a str,
    pub connect_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub pool: &'a PoolConfig,
    pub circuit_breaker: &'a CircuitBreakerConfig,
}

impl<'a> CheckReport<'a> {
    #[must_use]
    pub fn new(path: &Path, config: &'a Config) -> Self {
        Self {
            config: path.display().to_string(),
            upstream: &config.upstream.url,
            connect_timeout_ms: config.upstream.connect_timeout_ms,
            ping_timeout_ms: config.upstream.ping_timeout_ms,
            pool: &config.pool,
            circuit_breaker: &config.circuit_breaker,
        }
    }
}

/// Execute the check command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid.
pub fn execute(args: &CheckArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let report = CheckReport::new(&args.config, &config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CheckReport<'_>) {
    let pool = report.pool;
    let upstream = if report.upstream.is_empty() {
        "(not set)"
    } else {
        report.upstream
    };

    println!("Configuration OK: {}", report.config);
    println!("  upstream                  {upstream}");
    println!(
        "  timeouts                  connect {}ms, ping {}ms",
        report.connect_timeout_ms, report.ping_timeout_ms
    );
    println!("  pool                      {}", pool.name);
    println!(
        "  connections               {}..{} ({} per client)",
        pool.min_connections, pool.max_connections, pool.max_connections_per_client
    );
    println!("  multiplexing              {}", pool.enable_multiplexing);
    println!(
        "  subscriptions/connection  {}",
        pool.max_subscriptions_per_connection
    );
    println!("  idle timeout              {}s", pool.idle_timeout_secs);
    println!(
        "  health check              every {}s",
        pool.health_check_interval_secs
    );
    println!(
        "  circuit breaker           {} failures, {}s recovery",
        report.circuit_breaker.failure_threshold, report.circuit_breaker.recovery_timeout_secs
    );
}
