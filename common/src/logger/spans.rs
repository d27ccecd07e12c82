use std::time::{Duration, Instant};

use tracing::{Span, field};

use super::TraceId;

/// Root span for one poller task. `source` is filled in once a fetch
/// has been served.
pub fn poll_span(resource: &str, subject: &str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "poll",
        resource = %resource,
        subject = %subject,
        trace_id = %trace_id,
        source = field::Empty
    )
}

/// Create a child span (inherits trace_id automatically)
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name)
}

/// Awaits `fut` and emits a `performance` warning if it took longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
