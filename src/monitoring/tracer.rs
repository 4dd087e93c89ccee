/*!
 * Run Tracing
 * Structured tracing setup and the per-run root span
 *
 * - Run ID on the root span correlates orchestrator and capture-thread lines
 * - JSON output for machine collection, compact text otherwise
 */

use std::time::Instant;
use tracing::{info, span, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Environment switch for JSON log output
pub const ENV_TRACE_JSON: &str = "STRESS_TRACE_JSON";

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - STRESS_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_requested(std::env::var(ENV_TRACE_JSON).ok().as_deref()) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

/// Generate a unique ID for one stress run
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Root span of a stress run, logs total duration on drop
pub struct RunSpan {
    span: tracing::Span,
    start: Instant,
    run_id: String,
}

impl RunSpan {
    pub fn new(name: &'static str) -> Self {
        let run_id = generate_run_id();
        let span = span!(
            Level::INFO,
            "stackshot_spawn_exit",
            run = name,
            run_id = %run_id,
            duration_ms = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Enter the span on the current thread
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for RunSpan {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        self.span.record("duration_ms", duration_ms);
        let _entered = self.span.enter();
        info!(run_id = %self.run_id, duration_ms, "stress run finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_switch() {
        assert!(json_requested(Some("1")));
        assert!(json_requested(Some("true")));
        assert!(!json_requested(Some("yes")));
        assert!(!json_requested(None));
    }

    #[test]
    fn test_run_ids_unique() {
        let a = RunSpan::new("test");
        let b = RunSpan::new("test");
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.run_id().len(), 36);
    }
}
