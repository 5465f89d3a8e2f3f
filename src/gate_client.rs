//! High level client orchestration.
//!
//! Wires the fingerprint session, the identify reporter, and the challenge
//! solver into an HTTP client that transparently satisfies proof-of-work
//! gates: identity headers go out with every request, a 423 response
//! triggers one solve-and-replay cycle, and every failure path surfaces the
//! original response unchanged.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;

use crate::challenge::codec::{
    CHALLENGE_HEADER, PowChallenge, PowSolution, REASON_HEADER, SOLUTION_HEADER, decode_challenge,
    encode_solution,
};
use crate::challenge::solver::PowSolver;
use crate::events::{
    ChallengeCallbacks, ChallengeFailedEvent, ChallengeReceivedEvent, ChallengeSolvedEvent,
    EventDispatcher, EventHandler, GateEvent, LoggingHandler, MetricsHandler, PostResponseEvent,
    PreRequestEvent,
};
use crate::fingerprint::environment::{Environment, HostEnvironment};
use crate::fingerprint::identity::Identity;
use crate::identify::{
    DEFAULT_IDENTIFY_URL, DEFAULT_IDENTIFY_WAIT, IdentifyReporter, REQUEST_ID_HEADER,
    VISITOR_ID_HEADER,
};
use crate::metrics::{GateMetrics, GateStats};
use crate::session::SessionContext;
use crate::transport::{
    HttpTransport, OriginalRequest, ReqwestTransport, TransportError, TransportResponse,
};

/// Status the gate answers with while a challenge is outstanding.
const LOCKED_STATUS: u16 = 423;

/// Result alias used across the orchestration layer.
pub type GateResult<T> = Result<T, GateError>;

/// High-level error surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("utf8 conversion failed: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("header conversion failed: {0}")]
    InvalidHeader(String),
}

/// Read-only HTTP response returned by the client.
#[derive(Debug, Clone)]
pub struct GateResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
}

impl GateResponse {
    fn from_transport(response: TransportResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            url: response.url,
        }
    }

    /// HTTP status code after any challenge handling.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Final URL of the response.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the gate is still holding the request.
    pub fn is_locked(&self) -> bool {
        self.status == LOCKED_STATUS
    }

    /// Convenience helper returning the body as UTF-8 text.
    pub async fn text(&self) -> GateResult<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    /// Raw body bytes.
    pub async fn bytes(&self) -> Bytes {
        self.body.clone()
    }
}

/// Client configuration used by the builder.
#[derive(Clone)]
pub struct GateClientConfig {
    pub identify_url: String,
    pub auto_solve_challenge: bool,
    pub auto_identify: bool,
    pub attach_identity: bool,
    pub identify_wait: Duration,
    pub solver: PowSolver,
    pub enable_metrics: bool,
}

impl Default for GateClientConfig {
    fn default() -> Self {
        Self {
            identify_url: DEFAULT_IDENTIFY_URL.to_string(),
            auto_solve_challenge: true,
            auto_identify: true,
            attach_identity: true,
            identify_wait: DEFAULT_IDENTIFY_WAIT,
            solver: PowSolver::new(),
            enable_metrics: true,
        }
    }
}

/// Fluent builder for [`GateClient`].
pub struct GateClientBuilder {
    config: GateClientConfig,
    environment: Option<Arc<dyn Environment>>,
    transport: Option<Arc<dyn HttpTransport>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    callbacks: ChallengeCallbacks,
}

impl GateClientBuilder {
    pub fn new() -> Self {
        Self {
            config: GateClientConfig::default(),
            environment: None,
            transport: None,
            handlers: Vec::new(),
            callbacks: ChallengeCallbacks::default(),
        }
    }

    pub fn with_identify_url(mut self, url: impl Into<String>) -> Self {
        self.config.identify_url = url.into();
        self
    }

    pub fn with_identify_wait(mut self, wait: Duration) -> Self {
        self.config.identify_wait = wait;
        self
    }

    pub fn with_solver(mut self, solver: PowSolver) -> Self {
        self.config.solver = solver;
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Surface the gate's lock reason, e.g. for UX copy.
    pub fn on_challenge_received<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_received = Some(Box::new(callback));
        self
    }

    pub fn on_challenge_solved<F>(mut self, callback: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.callbacks.on_solved = Some(Box::new(callback));
        self
    }

    pub fn on_challenge_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_failed = Some(Box::new(callback));
        self
    }

    pub fn disable_auto_solve(mut self) -> Self {
        self.config.auto_solve_challenge = false;
        self
    }

    /// Skip the background identify report entirely.
    pub fn disable_identify(mut self) -> Self {
        self.config.auto_identify = false;
        self
    }

    /// Skip identity headers, for embedded contexts with no environment of
    /// their own to fingerprint.
    pub fn disable_identity_headers(mut self) -> Self {
        self.config.attach_identity = false;
        self
    }

    pub fn disable_metrics(mut self) -> Self {
        self.config.enable_metrics = false;
        self
    }

    pub fn build(self) -> GateResult<GateClient> {
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(HostEnvironment::detect()));
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let metrics = self.config.enable_metrics.then(GateMetrics::new);

        let mut events = EventDispatcher::new();
        events.register_handler(Arc::new(LoggingHandler));
        if let Some(ref collector) = metrics {
            events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
        }
        if !self.callbacks.is_empty() {
            events.register_handler(Arc::new(self.callbacks));
        }
        for handler in self.handlers {
            events.register_handler(handler);
        }

        let session = RwLock::new(Arc::new(SessionContext::new(environment.clone())));
        Ok(GateClient {
            config: self.config,
            environment,
            transport,
            session,
            events: Arc::new(events),
            metrics,
        })
    }
}

impl Default for GateClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main client orchestrator.
pub struct GateClient {
    config: GateClientConfig,
    environment: Arc<dyn Environment>,
    transport: Arc<dyn HttpTransport>,
    session: RwLock<Arc<SessionContext>>,
    events: Arc<EventDispatcher>,
    metrics: Option<GateMetrics>,
}

impl GateClient {
    /// Construct a client with default configuration.
    pub fn new() -> GateResult<Self> {
        GateClient::builder().build()
    }

    /// Obtain a builder to customise the client instance.
    pub fn builder() -> GateClientBuilder {
        GateClientBuilder::new()
    }

    /// Snapshot of the client's metrics, when collection is enabled.
    pub fn metrics(&self) -> Option<GateStats> {
        self.metrics.as_ref().map(GateMetrics::snapshot)
    }

    /// Discard all session state: the next request collects a fresh
    /// fingerprint and reports identity again.
    pub fn new_session(&self) {
        let fresh = Arc::new(SessionContext::new(self.environment.clone()));
        *self.session.write().expect("session lock poisoned") = fresh;
    }

    /// Force the identify report for `origin` now instead of waiting for the
    /// deferred schedule. Still at most one report per session.
    pub async fn identify(&self, origin: &str) -> GateResult<()> {
        let origin = Url::parse(origin)?;
        let session = self.session();
        self.reporter(&session).send(origin).await;
        Ok(())
    }

    /// Perform an HTTP GET request.
    pub async fn get(&self, url: &str) -> GateResult<GateResponse> {
        let url = Url::parse(url)?;
        self.request(Method::GET, url, None).await
    }

    /// Perform an HTTP POST request with a body.
    pub async fn post(&self, url: &str, body: Vec<u8>) -> GateResult<GateResponse> {
        let url = Url::parse(url)?;
        self.request(Method::POST, url, Some(body)).await
    }

    /// Perform an arbitrary HTTP request.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> GateResult<GateResponse> {
        let session = self.session();
        if self.config.auto_identify {
            self.reporter(&session).schedule(url.clone());
        }
        session.wait_for_identify(self.config.identify_wait).await;

        let mut headers = HeaderMap::new();
        if self.config.attach_identity {
            set_identity_headers(&mut headers, session.identity().await)?;
        }

        let original = OriginalRequest::new(method.clone(), url.clone())
            .with_headers(headers.clone())
            .with_body(body.clone());

        self.events.dispatch(GateEvent::PreRequest(PreRequestEvent {
            url: url.clone(),
            method: method.clone(),
            headers: headers.clone(),
            timestamp: Utc::now(),
        }));

        let started = Instant::now();
        let response = self
            .transport
            .send(&method, &url, &headers, body.as_deref())
            .await?;
        let latency = started.elapsed();

        self.events
            .dispatch(GateEvent::PostResponse(PostResponseEvent {
                url: response.url.clone(),
                method: method.clone(),
                status: response.status,
                latency,
                timestamp: Utc::now(),
            }));

        let resolved = self.run_challenge_cycle(response, original, &session).await?;
        Ok(GateResponse::from_transport(resolved))
    }

    fn session(&self) -> Arc<SessionContext> {
        self.session.read().expect("session lock poisoned").clone()
    }

    fn reporter(&self, session: &Arc<SessionContext>) -> IdentifyReporter {
        IdentifyReporter::new(
            self.transport.clone(),
            self.config.identify_url.clone(),
            session.clone(),
            self.events.clone(),
        )
    }

    /// Run the (at most one) challenge cycle for a response. Every failure
    /// path hands the original response back unchanged, so callers still see
    /// the 423 they must already handle.
    async fn run_challenge_cycle(
        &self,
        response: TransportResponse,
        original: OriginalRequest,
        session: &Arc<SessionContext>,
    ) -> GateResult<TransportResponse> {
        let mut phase = CyclePhase::Direct;
        loop {
            phase = match phase {
                CyclePhase::Direct => {
                    if response.status != LOCKED_STATUS || !self.config.auto_solve_challenge {
                        return Ok(response);
                    }
                    let Some(encoded) = response.header_str(CHALLENGE_HEADER) else {
                        return Ok(response);
                    };
                    let reason = response.header_str(REASON_HEADER).unwrap_or("").to_string();
                    self.events
                        .dispatch(GateEvent::ChallengeReceived(ChallengeReceivedEvent {
                            url: original.url.clone(),
                            reason,
                            timestamp: Utc::now(),
                        }));
                    match decode_challenge(encoded) {
                        Some(challenge) => CyclePhase::Solving { challenge },
                        None => {
                            // Fail open: an undecodable challenge is the
                            // server's problem, not grounds to eat the reply.
                            log::warn!("undecodable challenge header; passing 423 through");
                            return Ok(response);
                        }
                    }
                }
                CyclePhase::Solving { challenge } => {
                    let started = Instant::now();
                    match self.config.solver.solve(&challenge).await {
                        Ok(solution) => {
                            self.events
                                .dispatch(GateEvent::ChallengeSolved(ChallengeSolvedEvent {
                                    url: original.url.clone(),
                                    counter: solution.counter,
                                    solve_time: started.elapsed(),
                                    timestamp: Utc::now(),
                                }));
                            CyclePhase::Retrying { solution }
                        }
                        Err(err) => {
                            self.dispatch_failure(&original.url, err.to_string());
                            return Ok(response);
                        }
                    }
                }
                CyclePhase::Retrying { solution } => {
                    return match self.replay(&original, &solution, session).await {
                        Ok(retry) => Ok(retry),
                        Err(err) => {
                            self.dispatch_failure(&original.url, err.to_string());
                            Ok(response)
                        }
                    };
                }
            };
        }
    }

    /// Resend the captured request once, with fresh identity headers and the
    /// solution attached.
    async fn replay(
        &self,
        original: &OriginalRequest,
        solution: &PowSolution,
        session: &Arc<SessionContext>,
    ) -> GateResult<TransportResponse> {
        let mut headers = original.headers.clone();
        if self.config.attach_identity {
            set_identity_headers(&mut headers, session.identity().await)?;
        }
        let encoded = encode_solution(solution);
        headers.insert(
            HeaderName::from_static(SOLUTION_HEADER),
            HeaderValue::from_str(&encoded)
                .map_err(|_| GateError::InvalidHeader(SOLUTION_HEADER.into()))?,
        );

        log::info!(
            "replaying {} {} with challenge solution",
            original.method,
            original.url
        );
        let response = self
            .transport
            .send(
                &original.method,
                &original.url,
                &headers,
                original.body.as_deref(),
            )
            .await?;
        Ok(response)
    }

    fn dispatch_failure(&self, url: &Url, error: String) {
        self.events
            .dispatch(GateEvent::ChallengeFailed(ChallengeFailedEvent {
                url: url.clone(),
                error,
                timestamp: Utc::now(),
            }));
    }
}

/// Phases of the challenge cycle for one outbound request. `Retrying`
/// terminates the cycle unconditionally, so a replay can never trigger a
/// second solve.
enum CyclePhase {
    Direct,
    Solving { challenge: PowChallenge },
    Retrying { solution: PowSolution },
}

fn set_identity_headers(headers: &mut HeaderMap, identity: &Identity) -> GateResult<()> {
    headers.insert(
        HeaderName::from_static(VISITOR_ID_HEADER),
        HeaderValue::from_str(&identity.visitor_id)
            .map_err(|_| GateError::InvalidHeader(VISITOR_ID_HEADER.into()))?,
    );
    headers.insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&identity.request_id)
            .map_err(|_| GateError::InvalidHeader(REQUEST_ID_HEADER.into()))?,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::collector::FingerprintComponents;
    use crate::fingerprint::identity::synthesize;

    #[test]
    fn default_config_solves_and_identifies() {
        let config = GateClientConfig::default();
        assert!(config.auto_solve_challenge);
        assert!(config.auto_identify);
        assert!(config.attach_identity);
        assert_eq!(config.identify_wait, Duration::from_millis(500));
    }

    #[test]
    fn identity_headers_round_trip_through_header_map() {
        let identity = synthesize(FingerprintComponents::default());
        let mut headers = HeaderMap::new();
        set_identity_headers(&mut headers, &identity).unwrap();
        assert_eq!(
            headers.get(VISITOR_ID_HEADER).unwrap().to_str().unwrap(),
            identity.visitor_id
        );
        assert_eq!(
            headers.get(REQUEST_ID_HEADER).unwrap().to_str().unwrap(),
            identity.request_id
        );
    }
}
