//! Event system.
//!
//! Provides hooks for metrics, logging, and caller reactions around identify
//! reporting and challenge activity.

use chrono::{DateTime, Utc};
use http::{HeaderMap, Method};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::metrics::GateMetrics;

/// Structured pre-request event.
#[derive(Debug, Clone)]
pub struct PreRequestEvent {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub timestamp: DateTime<Utc>,
}

/// Structured post-response event.
#[derive(Debug, Clone)]
pub struct PostResponseEvent {
    pub url: Url,
    pub method: Method,
    pub status: u16,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IdentifySentEvent {
    pub visitor_id: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChallengeReceivedEvent {
    pub url: Url,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChallengeSolvedEvent {
    pub url: Url,
    pub counter: u64,
    pub solve_time: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChallengeFailedEvent {
    pub url: Url,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum GateEvent {
    PreRequest(PreRequestEvent),
    PostResponse(PostResponseEvent),
    IdentifySent(IdentifySentEvent),
    ChallengeReceived(ChallengeReceivedEvent),
    ChallengeSolved(ChallengeSolvedEvent),
    ChallengeFailed(ChallengeFailedEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &GateEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: GateEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &GateEvent) {
        match event {
            GateEvent::PreRequest(pre) => {
                log::debug!("-> {} {}", pre.method, pre.url);
            }
            GateEvent::PostResponse(post) => {
                log::debug!(
                    "<- {} {} -> {} ({:.2}s)",
                    post.method,
                    post.url,
                    post.status,
                    post.latency.as_secs_f64()
                );
            }
            GateEvent::IdentifySent(sent) => {
                log::debug!("identify report for {} sent={}", sent.visitor_id, sent.success);
            }
            GateEvent::ChallengeReceived(received) => {
                log::info!(
                    "challenge received for {} (reason: {})",
                    received.url,
                    received.reason
                );
            }
            GateEvent::ChallengeSolved(solved) => {
                log::info!(
                    "challenge solved for {} at counter {} in {:.3}s",
                    solved.url,
                    solved.counter,
                    solved.solve_time.as_secs_f64()
                );
            }
            GateEvent::ChallengeFailed(failed) => {
                log::warn!("challenge failed for {} -> {}", failed.url, failed.error);
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: GateMetrics,
}

impl MetricsHandler {
    pub fn new(metrics: GateMetrics) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &GateEvent) {
        match event {
            GateEvent::PostResponse(post) => {
                self.metrics.record_response(post.status);
            }
            GateEvent::ChallengeSolved(solved) => {
                self.metrics.record_solve(solved.solve_time);
            }
            GateEvent::ChallengeFailed(_) => {
                self.metrics.record_failure();
            }
            _ => {}
        }
    }
}

/// Bridges per-client challenge callbacks into the event stream.
#[derive(Default)]
pub struct ChallengeCallbacks {
    pub on_received: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_solved: Option<Box<dyn Fn(Duration) + Send + Sync>>,
    pub on_failed: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl ChallengeCallbacks {
    pub fn is_empty(&self) -> bool {
        self.on_received.is_none() && self.on_solved.is_none() && self.on_failed.is_none()
    }
}

impl EventHandler for ChallengeCallbacks {
    fn handle(&self, event: &GateEvent) {
        match event {
            GateEvent::ChallengeReceived(received) => {
                if let Some(callback) = &self.on_received {
                    callback(&received.reason);
                }
            }
            GateEvent::ChallengeSolved(solved) => {
                if let Some(callback) = &self.on_solved {
                    callback(solved.solve_time);
                }
            }
            GateEvent::ChallengeFailed(failed) => {
                if let Some(callback) = &self.on_failed {
                    callback(&failed.error);
                }
            }
            _ => {}
        }
    }
}
