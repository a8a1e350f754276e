use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "courtside_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "courtside_operation_duration_seconds";

// ── Domain signals ──────────────────────────────────────────────

/// Counter: rejected overlaps. Labels: stage (precheck | commit).
pub const CONFLICTS_TOTAL: &str = "courtside_conflicts_total";

/// Counter: requests refused by the authorization resolver. Labels: operation.
pub const PERMISSION_DENIED_TOTAL: &str = "courtside_permission_denied_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
