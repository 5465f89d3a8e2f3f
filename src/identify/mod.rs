//! Once-per-session identity reporting.
//!
//! The report is telemetry, not a functional dependency: it fires off the
//! caller's critical path, swallows network failures, and always resolves
//! the session's completion latch so waiters are never stuck.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use crate::events::{EventDispatcher, GateEvent, IdentifySentEvent};
use crate::fingerprint::collector::FingerprintComponents;
use crate::session::SessionContext;
use crate::transport::{HttpTransport, TransportError};

/// Well-known collector endpoint; override per integration.
pub const DEFAULT_IDENTIFY_URL: &str = "https://identify.gatepass.dev";

/// Request header carrying the visitor id.
pub const VISITOR_ID_HEADER: &str = "x-visitor-id";
/// Request header carrying the per-session request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Idle defer before the background report fires.
const REPORT_DEFER: Duration = Duration::from_millis(100);
/// Default bound callers wait on an in-flight report.
pub const DEFAULT_IDENTIFY_WAIT: Duration = Duration::from_millis(500);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyPayload<'a> {
    visitor_id: &'a str,
    request_id: &'a str,
    confidence: f64,
    components: &'a FingerprintComponents,
    url: &'a str,
    incognito: bool,
}

/// Sends the synthesized identity to the collector once per session.
#[derive(Clone)]
pub struct IdentifyReporter {
    transport: Arc<dyn HttpTransport>,
    identify_url: String,
    session: Arc<SessionContext>,
    events: Arc<EventDispatcher>,
}

impl IdentifyReporter {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        identify_url: String,
        session: Arc<SessionContext>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            transport,
            identify_url,
            session,
            events,
        }
    }

    /// Schedule the one-shot report off the caller's critical path.
    /// Subsequent calls in the same session are no-ops.
    pub fn schedule(&self, origin: Url) {
        if !self.session.begin_schedule() {
            return;
        }
        let reporter = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REPORT_DEFER).await;
            reporter.deliver(origin).await;
        });
    }

    /// Send immediately. No-op when a report already went out this session.
    pub async fn send(&self, origin: Url) {
        self.session.begin_schedule();
        self.deliver(origin).await;
    }

    async fn deliver(&self, origin: Url) {
        if !self.session.begin_send() {
            return;
        }
        let result = self.post(&origin).await;
        if let Err(ref err) = result {
            // Telemetry only; the caller never sees this failure.
            log::debug!("identify report failed: {err}");
        }
        let visitor_id = self.session.identity().await.visitor_id.clone();
        self.events.dispatch(GateEvent::IdentifySent(IdentifySentEvent {
            visitor_id,
            success: result.is_ok(),
            timestamp: Utc::now(),
        }));
        self.session.latch().resolve();
    }

    async fn post(&self, origin: &Url) -> Result<(), TransportError> {
        let identity = self.session.identity().await;
        let payload = IdentifyPayload {
            visitor_id: &identity.visitor_id,
            request_id: &identity.request_id,
            confidence: identity.confidence,
            components: &identity.components,
            url: origin.as_str(),
            incognito: privacy_mode_guess(&identity.components),
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let endpoint = endpoint_url(&self.identify_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.transport
            .send(&Method::POST, &endpoint, &headers, Some(&body))
            .await?;
        Ok(())
    }
}

/// `{identify_url}/identify`, tolerant of a trailing slash.
fn endpoint_url(base: &str) -> Result<Url, TransportError> {
    let joined = format!("{}/identify", base.trim_end_matches('/'));
    Url::parse(&joined).map_err(|err| TransportError::Transport(err.to_string()))
}

/// Best-effort private-mode guess: the persistent store rejected writes
/// while the scratch store accepted them.
pub fn privacy_mode_guess(components: &FingerprintComponents) -> bool {
    matches!(
        (components.local_storage, components.session_storage),
        (Some(false), Some(true))
    )
}
