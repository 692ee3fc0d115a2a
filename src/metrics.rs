//! Vendor-agnostic metrics collection via a pluggable sink.
//!
//! Implement [`MetricsSink`] and install it with [`set_sink`] to observe
//! evaluations and policy reloads without tying the library to a
//! specific metrics backend. If no sink is set, a no-op sink is used and
//! nothing is recorded.
//!
//! Sinks are called synchronously on the evaluation path and must be
//! thread-safe; they should return quickly.

use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::warn;

/// Snapshot of one policy evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationStats {
    /// Total time spent evaluating the request.
    pub duration: Duration,
    /// Whether the decision was Allow.
    pub allowed: bool,
    /// Principal identifier, e.g. `User::"alice"`.
    pub principal_id: String,
    /// Action identifier, e.g. `Action::"view"`.
    pub action_id: String,
}

/// Snapshot of one policy reload.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadStats {
    /// Time when the reload completed.
    pub reload_time: std::time::SystemTime,
}

/// Trait for consuming evaluation and reload events.
pub trait MetricsSink: Send + Sync {
    /// Called after each evaluation, regardless of outcome.
    fn on_evaluation(&self, stats: &EvaluationStats);

    /// Called after each successful policy reload.
    fn on_reload(&self, stats: &ReloadStats);
}

/// No-op sink; events are silently dropped.
struct NoOpSink;

impl MetricsSink for NoOpSink {
    fn on_evaluation(&self, _stats: &EvaluationStats) {}
    fn on_reload(&self, _stats: &ReloadStats) {}
}

static SINK: OnceLock<Arc<dyn MetricsSink>> = OnceLock::new();

fn sink() -> Arc<dyn MetricsSink> {
    SINK.get_or_init(|| Arc::new(NoOpSink)).clone()
}

/// Install the global metrics sink.
///
/// Call once at application startup, before the first evaluation; the
/// sink cannot be swapped after it has been initialized.
pub fn set_sink(new_sink: Arc<dyn MetricsSink>) {
    if SINK.set(new_sink).is_err() {
        warn!(
            "Metrics sink was already initialized. Ignoring subsequent set_sink call. Set the sink before the first evaluation."
        );
    }
}

pub(crate) fn record_evaluation(
    allowed: bool,
    duration: Duration,
    principal_id: String,
    action_id: String,
) {
    sink().on_evaluation(&EvaluationStats {
        duration,
        allowed,
        principal_id,
        action_id,
    });
}

pub(crate) fn record_reload() {
    sink().on_reload(&ReloadStats {
        reload_time: std::time::SystemTime::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_with_default_sink() {
        // Default sink is no-op; recording must not panic.
        record_evaluation(
            true,
            Duration::from_micros(250),
            r#"User::"alice""#.to_string(),
            r#"Action::"view""#.to_string(),
        );
        record_reload();
    }

    #[test]
    fn test_evaluation_stats_serialization() {
        let stats = EvaluationStats {
            duration: Duration::from_millis(42),
            allowed: true,
            principal_id: r#"User::"alice""#.to_string(),
            action_id: r#"Action::"view""#.to_string(),
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("true"));
        assert!(json.contains("alice"));
    }
}
