use clap::Parser;

/// Operator-wide configuration, parsed once in `main` before telemetry is
/// initialized so the log format choice is available immediately.
#[derive(Parser, Debug, Clone)]
#[command(name = "observability-platform-operator")]
pub struct OperatorConfig {
    /// Address the health/readiness/metrics HTTP listener binds to.
    #[arg(long, env = "HEALTH_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub health_bind_addr: String,

    /// Number of Platform keys the controller reconciles concurrently.
    #[arg(long, env = "OPERATOR_CONCURRENCY", default_value_t = 3)]
    pub concurrency: u16,

    /// Requeue interval for a successfully reconciled Platform, in seconds.
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value_t = 300)]
    pub reconcile_interval_secs: u64,

    /// Drift-detection sweep interval, in seconds. Only read when the
    /// `drift` feature is compiled in.
    #[arg(long, env = "DRIFT_CHECK_INTERVAL_SECS", default_value_t = 300)]
    pub drift_check_interval_secs: u64,

    /// `json` for structured logs, `pretty` for human-readable output.
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,
}
