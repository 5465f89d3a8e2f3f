//! # gatepass-rs
//!
//! Client-side companion for services that gate traffic behind proof-of-work
//! throttles and visitor fingerprinting.
//!
//! The client fingerprints its environment once per session, reports the
//! synthesized identity to a collector endpoint in the background, attaches
//! identity headers to every outbound request, and transparently answers
//! HTTP 423 challenges: decode the puzzle from the response headers, search
//! for a counter whose digest meets the difficulty target, and replay the
//! original request exactly once with the solution attached.
//!
//! ## Features
//!
//! - Async HTTP client built on reqwest with a pluggable transport seam
//! - Environment fingerprinting with per-signal fail-open collection
//! - Stable visitor ids with weighted-coverage confidence scoring
//! - Bit-exact proof-of-work solving with cooperative yielding
//! - Event hooks and metrics around identify and challenge activity
//!
//! ## Example
//!
//! ```no_run
//! use gatepass_rs::GateClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GateClient::new()?;
//!     let response = client.get("https://api.example.com/session").await?;
//!     println!("Response: {}", response.status());
//!     Ok(())
//! }
//! ```

mod gate_client;

pub mod challenge;
pub mod events;
pub mod fingerprint;
pub mod identify;
pub mod metrics;
pub mod session;
pub mod transport;

pub use crate::gate_client::{
    GateClient,
    GateClientBuilder,
    GateClientConfig,
    GateError,
    GateResponse,
    GateResult,
};

pub use crate::challenge::{
    CHALLENGE_HEADER,
    DEFAULT_MAX_ITERATIONS,
    PowChallenge,
    PowSolution,
    PowSolver,
    REASON_HEADER,
    SOLUTION_HEADER,
    SolverError,
    decode_challenge,
    decode_solution,
    encode_challenge,
    encode_solution,
    has_leading_zero_bits,
    leading_zero_bits,
    verify_solution,
};

pub use crate::fingerprint::{
    Collector,
    DeviceProfile,
    Environment,
    FingerprintComponents,
    HostEnvironment,
    Identity,
    WebglInfo,
};

pub use crate::identify::{
    DEFAULT_IDENTIFY_URL,
    DEFAULT_IDENTIFY_WAIT,
    IdentifyReporter,
    REQUEST_ID_HEADER,
    VISITOR_ID_HEADER,
};

pub use crate::events::{
    ChallengeFailedEvent,
    ChallengeReceivedEvent,
    ChallengeSolvedEvent,
    EventDispatcher,
    EventHandler,
    GateEvent,
    IdentifySentEvent,
    LoggingHandler,
    MetricsHandler,
    PostResponseEvent,
    PreRequestEvent,
};

pub use crate::metrics::{GateMetrics, GateStats};

pub use crate::session::{CompletionLatch, SessionContext};

pub use crate::transport::{
    HttpTransport,
    OriginalRequest,
    ReqwestTransport,
    TransportError,
    TransportResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
