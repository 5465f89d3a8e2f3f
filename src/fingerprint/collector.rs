//! Signal collection.
//!
//! Every probe is guarded independently: a capability the environment lacks
//! drops that signal and nothing else. Collection itself never fails.

use std::sync::Arc;

use serde::Serialize;

use super::audio;
use super::canvas::{self, NO_CANVAS};
use super::environment::{Environment, WebglInfo};
use super::fonts::detect_fonts;

/// Flat map of everything collection managed to observe, in the wire shape
/// expected by the identify endpoint. Absent signals are omitted from JSON.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintComponents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_depth: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_concurrency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_touch_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webgl: Option<WebglInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fonts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_storage: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_storage: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_db: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webdriver: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub plugins: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touch_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<u64>,
}

/// Gathers every signal the environment can provide.
pub struct Collector {
    environment: Arc<dyn Environment>,
}

impl Collector {
    pub fn new(environment: Arc<dyn Environment>) -> Self {
        Self { environment }
    }

    pub async fn collect(&self) -> FingerprintComponents {
        let mut components = FingerprintComponents::default();

        if let Some(screen) = self.environment.screen() {
            components.screen_resolution =
                Some(format!("{}x{}", screen.resolution.0, screen.resolution.1));
            components.color_depth = Some(screen.color_depth);
            components.pixel_ratio = Some(screen.pixel_ratio);
        }

        if let Some(agent) = self.environment.agent() {
            components.user_agent = Some(agent.user_agent);
            components.platform = Some(agent.platform);
            components.vendor = Some(agent.vendor);
            components.language = Some(agent.language);
            components.languages = agent.languages;
            components.cookies_enabled = Some(agent.cookies_enabled);
        }

        if let Some(hardware) = self.environment.hardware() {
            components.hardware_concurrency = hardware.concurrency;
            components.device_memory = hardware.device_memory;
            components.max_touch_points = Some(hardware.max_touch_points);
        }

        if let Some(timezone) = self.environment.timezone() {
            components.timezone = Some(timezone.name);
            components.timezone_offset = Some(timezone.offset_minutes);
        }

        // A blocked canvas is a sentinel; no canvas at all is the other one.
        components.canvas = Some(match self.environment.canvas() {
            Some(quirks) => canvas::canvas_fingerprint(&quirks),
            None => NO_CANVAS.to_string(),
        });

        components.webgl = self.environment.webgl();

        if let Some(oracle) = self.environment.fonts() {
            components.fonts = detect_fonts(&oracle);
        }

        if let Some(storage) = self.environment.storage() {
            components.local_storage = Some(storage.persistent);
            components.session_storage = Some(storage.scratch);
            components.indexed_db = Some(storage.database);
        }

        if let Some(features) = self.environment.features() {
            components.webdriver = Some(features.automation_controlled);
            components.plugins = features.plugins;
            components.touch_support = Some(features.touch_support);
        }

        if let Some(connection) = self.environment.connection() {
            components.connection_type = connection.effective_type;
            components.downlink = connection.downlink;
            components.rtt = connection.rtt.map(|rtt| rtt.as_millis() as u64);
        }

        components.audio = match self.environment.audio() {
            Some(quirks) => audio::measure(&quirks).await,
            None => None,
        };

        components
    }
}
