//! Metrics collection utilities.
//!
//! Aggregates request and challenge outcomes with windowed solve-time
//! statistics for observability.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Aggregated counters for one client.
#[derive(Debug, Clone)]
pub struct GateStats {
    pub started_at: DateTime<Utc>,
    pub total_requests: u64,
    pub locked_responses: u64,
    pub challenges_solved: u64,
    pub challenges_failed: u64,
    pub average_solve_time: Option<Duration>,
    pub max_solve_time: Option<Duration>,
}

impl Default for GateStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_requests: 0,
            locked_responses: 0,
            challenges_solved: 0,
            challenges_failed: 0,
            average_solve_time: None,
            max_solve_time: None,
        }
    }
}

#[derive(Debug)]
struct MetricsState {
    stats: GateStats,
    solve_times: VecDeque<Duration>,
    max_window: usize,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            stats: GateStats::default(),
            solve_times: VecDeque::with_capacity(max_window),
            max_window,
        }
    }
}

/// Thread-safe metrics collector used by the orchestration layer.
#[derive(Clone, Debug)]
pub struct GateMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(128))),
        }
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    pub fn record_response(&self, status: u16) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.stats.total_requests += 1;
        if status == 423 {
            guard.stats.locked_responses += 1;
        }
    }

    pub fn record_solve(&self, solve_time: Duration) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.stats.challenges_solved += 1;
        if guard.solve_times.len() == guard.max_window {
            guard.solve_times.pop_front();
        }
        guard.solve_times.push_back(solve_time);
    }

    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.stats.challenges_failed += 1;
    }

    pub fn snapshot(&self) -> GateStats {
        let guard = self.inner.lock().expect("metrics lock poisoned");
        let mut stats = guard.stats.clone();
        if !guard.solve_times.is_empty() {
            let total: f64 = guard.solve_times.iter().map(|d| d.as_secs_f64()).sum();
            stats.average_solve_time = Some(Duration::from_secs_f64(
                total / guard.solve_times.len() as f64,
            ));
            stats.max_solve_time = guard.solve_times.iter().max().copied();
        }
        stats
    }
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_requests_and_challenge_outcomes() {
        let metrics = GateMetrics::new();
        metrics.record_response(200);
        metrics.record_response(423);
        metrics.record_solve(Duration::from_millis(80));
        metrics.record_solve(Duration::from_millis(120));
        metrics.record_failure();

        let stats = metrics.snapshot();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.locked_responses, 1);
        assert_eq!(stats.challenges_solved, 2);
        assert_eq!(stats.challenges_failed, 1);
        assert_eq!(stats.average_solve_time, Some(Duration::from_millis(100)));
        assert_eq!(stats.max_solve_time, Some(Duration::from_millis(120)));
    }
}
