//! Identity synthesis.
//!
//! Reduces a component map to a stable visitor id (digest of the
//! low-volatility subset), a single-use request id, and a weighted-coverage
//! confidence score.

use std::fmt::Write;

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::collector::FingerprintComponents;
use super::environment::WebglInfo;

/// Hex chars kept from the stable-subset digest.
const VISITOR_ID_LEN: usize = 20;

/// Synthesized identity for one session.
#[derive(Debug, Clone)]
pub struct Identity {
    pub visitor_id: String,
    pub request_id: String,
    pub confidence: f64,
    pub components: FingerprintComponents,
}

pub fn synthesize(components: FingerprintComponents) -> Identity {
    Identity {
        visitor_id: visitor_id(&components),
        request_id: generate_request_id(),
        confidence: confidence(&components),
        components,
    }
}

/// The signals expected to stay put across a session. Volatile ones
/// (connection speed, plugin enumeration) would defeat matching and stay
/// out. Field order is fixed, so serialization is deterministic.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StableSubset<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    screen_resolution: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_depth: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixel_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hardware_concurrency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timezone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    canvas: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webgl: Option<&'a WebglInfo>,
    fonts: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_touch_points: Option<u32>,
}

/// Deterministic digest of the stable subset, truncated.
pub fn visitor_id(components: &FingerprintComponents) -> String {
    let stable = StableSubset {
        screen_resolution: components.screen_resolution.as_deref(),
        color_depth: components.color_depth,
        pixel_ratio: components.pixel_ratio,
        platform: components.platform.as_deref(),
        hardware_concurrency: components.hardware_concurrency,
        device_memory: components.device_memory,
        timezone: components.timezone.as_deref(),
        canvas: components.canvas.as_deref(),
        webgl: components.webgl.as_ref(),
        fonts: &components.fonts,
        max_touch_points: components.max_touch_points,
    };
    let json = serde_json::to_string(&stable).unwrap_or_default();
    let mut hex = Sha256::digest(json.as_bytes()).iter().fold(
        String::with_capacity(64),
        |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        },
    );
    hex.truncate(VISITOR_ID_LEN);
    hex
}

/// 16 random bytes as a dashed hex id. Never reused; one per synthesis.
pub fn generate_request_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    let hex = bytes.iter().fold(String::with_capacity(32), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    });
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Weight per signal; the total is 100 so coverage reads as a percentage.
const WEIGHTS: [(&str, u32); 16] = [
    ("canvas", 15),
    ("webgl", 15),
    ("audio", 10),
    ("fonts", 15),
    ("screenResolution", 5),
    ("colorDepth", 3),
    ("pixelRatio", 5),
    ("hardwareConcurrency", 5),
    ("deviceMemory", 5),
    ("timezone", 5),
    ("platform", 3),
    ("maxTouchPoints", 3),
    ("plugins", 6),
    ("localStorage", 2),
    ("sessionStorage", 2),
    ("indexedDB", 1),
];

/// Weighted fraction of the signals that were actually collected, rounded
/// to two decimals. Empty arrays count as absent.
pub fn confidence(components: &FingerprintComponents) -> f64 {
    let mut score = 0u32;
    let mut total = 0u32;
    for (key, weight) in WEIGHTS {
        total += weight;
        if signal_present(components, key) {
            score += weight;
        }
    }
    if total == 0 {
        return 0.0;
    }
    (score as f64 / total as f64 * 100.0).round() / 100.0
}

fn signal_present(components: &FingerprintComponents, key: &str) -> bool {
    match key {
        "canvas" => components.canvas.as_deref().is_some_and(|v| !v.is_empty()),
        "webgl" => components.webgl.is_some(),
        "audio" => components.audio.is_some(),
        "fonts" => !components.fonts.is_empty(),
        "screenResolution" => components
            .screen_resolution
            .as_deref()
            .is_some_and(|v| !v.is_empty()),
        "colorDepth" => components.color_depth.is_some(),
        "pixelRatio" => components.pixel_ratio.is_some(),
        "hardwareConcurrency" => components.hardware_concurrency.is_some(),
        "deviceMemory" => components.device_memory.is_some(),
        "timezone" => components.timezone.as_deref().is_some_and(|v| !v.is_empty()),
        "platform" => components.platform.as_deref().is_some_and(|v| !v.is_empty()),
        "maxTouchPoints" => components.max_touch_points.is_some(),
        "plugins" => !components.plugins.is_empty(),
        "localStorage" => components.local_storage.is_some(),
        "sessionStorage" => components.session_storage.is_some(),
        "indexedDB" => components.indexed_db.is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::environment::WebglInfo;

    fn full_components() -> FingerprintComponents {
        FingerprintComponents {
            screen_resolution: Some("1920x1080".into()),
            color_depth: Some(24),
            pixel_ratio: Some(1.0),
            platform: Some("Win32".into()),
            hardware_concurrency: Some(8),
            device_memory: Some(8.0),
            timezone: Some("Europe/Berlin".into()),
            canvas: Some("1kfmrc8".into()),
            webgl: Some(WebglInfo {
                vendor: "Google Inc.".into(),
                renderer: "ANGLE (NVIDIA GeForce RTX 3080)".into(),
                extensions: vec!["WEBGL_lose_context".into()],
            }),
            audio: Some(124.75),
            fonts: vec!["Arial".into(), "Verdana".into()],
            max_touch_points: Some(0),
            plugins: vec!["PDF Viewer".into()],
            local_storage: Some(true),
            session_storage: Some(true),
            indexed_db: Some(true),
            ..FingerprintComponents::default()
        }
    }

    #[test]
    fn visitor_id_is_stable_for_identical_input() {
        let components = full_components();
        assert_eq!(visitor_id(&components), visitor_id(&components));
        assert_eq!(visitor_id(&components).len(), 20);
    }

    #[test]
    fn visitor_id_changes_when_any_stable_field_changes() {
        let base = full_components();
        let mut shifted = base.clone();
        shifted.timezone = Some("Asia/Tokyo".into());
        assert_ne!(visitor_id(&base), visitor_id(&shifted));

        let mut shifted = base.clone();
        shifted.canvas = Some("other".into());
        assert_ne!(visitor_id(&base), visitor_id(&shifted));
    }

    #[test]
    fn visitor_id_ignores_volatile_fields() {
        let base = full_components();
        let mut shifted = base.clone();
        shifted.plugins = vec!["Entirely Different".into()];
        shifted.downlink = Some(2.5);
        assert_eq!(visitor_id(&base), visitor_id(&shifted));
    }

    #[test]
    fn request_ids_are_uuid_shaped_and_unique() {
        let id = generate_request_id();
        assert_eq!(id.len(), 36);
        let segments: Vec<&str> = id.split('-').collect();
        assert_eq!(
            segments.iter().map(|s| s.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert_ne!(id, generate_request_id());
    }

    #[test]
    fn confidence_spans_zero_to_one() {
        assert_eq!(confidence(&FingerprintComponents::default()), 0.0);
        assert_eq!(confidence(&full_components()), 1.0);
    }

    #[test]
    fn confidence_grows_as_signals_appear() {
        let mut components = FingerprintComponents::default();
        let mut last = confidence(&components);

        components.canvas = Some("1kfmrc8".into());
        let next = confidence(&components);
        assert!(next > last);
        last = next;

        components.audio = Some(124.75);
        let next = confidence(&components);
        assert!(next > last);
        last = next;

        components.local_storage = Some(false);
        assert!(confidence(&components) > last);
    }

    #[test]
    fn empty_font_list_counts_as_absent() {
        let mut components = full_components();
        let full = confidence(&components);
        components.fonts = Vec::new();
        assert!((confidence(&components) - (full - 0.15)).abs() < 1e-9);
    }

    #[test]
    fn synthesize_wires_everything_together() {
        let identity = synthesize(full_components());
        assert_eq!(identity.visitor_id.len(), 20);
        assert_eq!(identity.confidence, 1.0);
        assert_eq!(identity.request_id.len(), 36);
    }
}
