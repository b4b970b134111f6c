use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured JSON logging. Call once at process start; the
/// routing layer owns the process, the core just provides the setup.
pub fn init_telemetry() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("spooltrack telemetry initialized");
    Ok(())
}

/// Correlation ID for linking the lock, store and audit calls of one
/// claim-transition sequence.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span carrying the common attributes of a claim-transition sequence.
pub fn create_claim_span(
    action: &str,
    spool_id: &str,
    worker_id: &str,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "claim_transition",
        action = action,
        spool.id = spool_id,
        worker.id = worker_id,
        correlation.id = correlation_id,
    )
}
