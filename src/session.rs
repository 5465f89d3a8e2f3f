//! Session-scoped shared state.
//!
//! The fingerprint cache, the identify-report flags, and the completion
//! latch are write-once-per-session, read-many. Building a fresh
//! `SessionContext` is the new-session operation; nothing here is global.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{OnceCell, watch};

use crate::fingerprint::collector::Collector;
use crate::fingerprint::environment::Environment;
use crate::fingerprint::identity::{self, Identity};

/// Resolve-at-most-once latch many waiters can await with a bounded timeout.
#[derive(Debug)]
pub struct CompletionLatch {
    tx: watch::Sender<bool>,
}

impl CompletionLatch {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn resolve(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_resolved(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until resolved or until `timeout` passes, whichever comes first.
    pub async fn wait(&self, timeout: Duration) {
        let mut rx = self.tx.subscribe();
        let _ = tokio::time::timeout(timeout, rx.wait_for(|resolved| *resolved)).await;
    }
}

/// Caches shared by the collector, reporter, and interceptor for the
/// lifetime of one session.
pub struct SessionContext {
    environment: Arc<dyn Environment>,
    identity: OnceCell<Identity>,
    identify_scheduled: AtomicBool,
    identify_sent: AtomicBool,
    latch: CompletionLatch,
}

impl SessionContext {
    pub fn new(environment: Arc<dyn Environment>) -> Self {
        Self {
            environment,
            identity: OnceCell::new(),
            identify_scheduled: AtomicBool::new(false),
            identify_sent: AtomicBool::new(false),
            latch: CompletionLatch::new(),
        }
    }

    pub fn environment(&self) -> Arc<dyn Environment> {
        self.environment.clone()
    }

    /// Identity for this session, collected on first use. Concurrent first
    /// calls coalesce into a single collection.
    pub async fn identity(&self) -> &Identity {
        self.identity
            .get_or_init(|| async {
                let components = Collector::new(self.environment.clone()).collect().await;
                identity::synthesize(components)
            })
            .await
    }

    /// First caller wins the right to schedule the identify report.
    pub fn begin_schedule(&self) -> bool {
        !self.identify_scheduled.swap(true, Ordering::SeqCst)
    }

    pub fn identify_scheduled(&self) -> bool {
        self.identify_scheduled.load(Ordering::SeqCst)
    }

    /// First caller wins the right to actually send it.
    pub fn begin_send(&self) -> bool {
        !self.identify_sent.swap(true, Ordering::SeqCst)
    }

    pub fn latch(&self) -> &CompletionLatch {
        &self.latch
    }

    /// Bounded wait for an in-flight identify report. Returns immediately
    /// when none was ever scheduled; ordering is best-effort, never a hard
    /// dependency.
    pub async fn wait_for_identify(&self, timeout: Duration) {
        if !self.identify_scheduled() {
            return;
        }
        self.latch.wait(timeout).await;
    }
}
