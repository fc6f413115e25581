//! Metrics for message dispatch
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.
//!
//! # Metrics
//!
//! - `router_messages_total`: Counter of dispatched messages by strategy
//! - `router_dispatch_duration_seconds`: Histogram of executor time by strategy and outcome
//! - `router_executor_failures_total`: Counter of failed attempts by strategy and error kind
//! - `router_retries_total`: Counter of retried transient failures by strategy
//!
//! Rotation, feedback and pruning counters are recorded where those
//! events happen.
//!
//! # Examples
//!
//! ```
//! use warehouse_router::classifier::Strategy;
//! use warehouse_router::orchestrator::metrics::DispatchMetrics;
//!
//! let metrics = DispatchMetrics::new(Strategy::Sql);
//! metrics.record_success();
//! ```

use metrics::{histogram, increment_counter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::classifier::Strategy;

/// Metrics for one dispatched message
///
/// Completion is recorded at most once; later calls are ignored.
#[derive(Debug)]
pub struct DispatchMetrics {
    strategy: Strategy,
    start: Instant,
    recorded: AtomicBool,
}

impl DispatchMetrics {
    /// Starts tracking a dispatch and counts the message
    pub fn new(strategy: Strategy) -> Self {
        increment_counter!("router_messages_total", "strategy" => strategy.as_str());
        Self {
            strategy,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Returns the strategy being dispatched
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Counts a failed attempt
    ///
    /// # Arguments
    ///
    /// * `kind` - Error kind label (`transient` or `permanent`)
    pub fn record_attempt_failure(&self, kind: &'static str) {
        increment_counter!(
            "router_executor_failures_total",
            "strategy" => self.strategy.as_str(),
            "kind" => kind
        );
    }

    /// Counts a retry
    pub fn record_retry(&self) {
        increment_counter!("router_retries_total", "strategy" => self.strategy.as_str());
    }

    /// Records a successful dispatch
    pub fn record_success(&self) {
        self.finish("success");
    }

    /// Records a dispatch that failed after any retry
    pub fn record_failure(&self) {
        self.finish("failure");
    }

    fn finish(&self, outcome: &'static str) {
        if self.recorded.swap(true, Ordering::AcqRel) {
            return;
        }
        histogram!(
            "router_dispatch_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "strategy" => self.strategy.as_str(),
            "outcome" => outcome
        );
    }
}
