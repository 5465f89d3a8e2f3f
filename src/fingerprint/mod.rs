//! Environment fingerprinting.
//!
//! Probes, signal collection, and identity synthesis. The collector gathers
//! whatever the environment offers; the synthesizer turns the result into a
//! stable visitor id with a coverage-based confidence score.

pub mod audio;
pub mod canvas;
pub mod collector;
pub mod environment;
pub mod fonts;
pub mod identity;

pub use audio::{AudioPipeline, AudioQuirks};
pub use canvas::{CANVAS_ERROR, CanvasQuirks, NO_CANVAS, canvas_fingerprint, murmur3_32};
pub use collector::{Collector, FingerprintComponents};
pub use environment::{
    AgentInfo, ConnectionInfo, DeviceProfile, Environment, FeatureInfo, HardwareInfo,
    HostEnvironment, ScreenInfo, StorageSupport, TimezoneInfo, WebglInfo,
};
pub use fonts::{FontOracle, detect_fonts};
pub use identity::{Identity, confidence, generate_request_id, synthesize, visitor_id};
