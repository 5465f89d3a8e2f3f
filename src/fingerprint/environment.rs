//! Host environment probes and device profiles.
//!
//! `Environment` is the crate's seam for everything fingerprinting reads
//! from the outside world. `HostEnvironment` composes genuine host signals
//! (parallelism, timezone, storage round trips) with a `DeviceProfile`
//! carrying the agent-surface values a native process cannot observe
//! directly. Every probe returns `Option`: a missing capability is an
//! expected outcome, not an error.

use std::time::Duration;

use chrono::Local;
use rand::seq::SliceRandom;
use serde::Serialize;

use super::audio::AudioQuirks;
use super::canvas::CanvasQuirks;
use super::fonts::FontOracle;

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenInfo {
    pub resolution: (u32, u32),
    pub color_depth: u8,
    pub pixel_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub user_agent: String,
    pub platform: String,
    pub vendor: String,
    pub language: String,
    pub languages: Vec<String>,
    pub cookies_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HardwareInfo {
    pub concurrency: Option<u32>,
    pub device_memory: Option<f64>,
    pub max_touch_points: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimezoneInfo {
    pub name: String,
    /// Minutes west of UTC.
    pub offset_minutes: i32,
}

/// GPU identity plus the sorted extension list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebglInfo {
    pub vendor: String,
    pub renderer: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSupport {
    pub persistent: bool,
    pub scratch: bool,
    pub database: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfo {
    pub automation_controlled: bool,
    pub plugins: Vec<String>,
    pub touch_support: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub effective_type: Option<String>,
    pub downlink: Option<f64>,
    pub rtt: Option<Duration>,
}

/// Probe surface consumed by the collector. Implementations must not block;
/// the collector applies its own timeout to the audio render.
pub trait Environment: Send + Sync {
    fn screen(&self) -> Option<ScreenInfo>;
    fn agent(&self) -> Option<AgentInfo>;
    fn hardware(&self) -> Option<HardwareInfo>;
    fn timezone(&self) -> Option<TimezoneInfo>;
    fn canvas(&self) -> Option<CanvasQuirks>;
    fn webgl(&self) -> Option<WebglInfo>;
    fn audio(&self) -> Option<AudioQuirks>;
    fn fonts(&self) -> Option<FontOracle>;
    fn storage(&self) -> Option<StorageSupport>;
    fn features(&self) -> Option<FeatureInfo>;
    fn connection(&self) -> Option<ConnectionInfo>;
}

/// Agent-surface values for one device class.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub user_agent: String,
    pub platform: String,
    pub vendor: String,
    pub languages: Vec<String>,
    pub screen: Option<ScreenInfo>,
    pub cores: Option<u32>,
    pub device_memory: Option<f64>,
    pub max_touch_points: u32,
    pub webgl: Option<WebglInfo>,
    pub installed_fonts: Vec<(&'static str, f64)>,
    pub canvas: Option<CanvasQuirks>,
    pub audio: Option<AudioQuirks>,
    pub plugins: Vec<String>,
    pub connection: Option<ConnectionInfo>,
}

impl DeviceProfile {
    pub fn chrome_desktop() -> Self {
        Self {
            name: "chrome-desktop",
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            platform: "Win32".into(),
            vendor: "Google Inc.".into(),
            languages: vec!["en-US".into(), "en".into()],
            screen: Some(ScreenInfo {
                resolution: (1920, 1080),
                color_depth: 24,
                pixel_ratio: 1.0,
            }),
            cores: Some(8),
            device_memory: Some(8.0),
            max_touch_points: 0,
            webgl: Some(WebglInfo {
                vendor: "Google Inc.".into(),
                renderer: "ANGLE (NVIDIA GeForce RTX 3080)".into(),
                extensions: sorted_extensions([
                    "ANGLE_instanced_arrays",
                    "EXT_blend_minmax",
                    "EXT_texture_filter_anisotropic",
                    "OES_element_index_uint",
                    "OES_standard_derivatives",
                    "OES_texture_float",
                    "WEBGL_debug_renderer_info",
                    "WEBGL_depth_texture",
                    "WEBGL_lose_context",
                ]),
            }),
            installed_fonts: vec![
                ("Arial", 0.48),
                ("Arial Black", 0.58),
                ("Calibri", 0.47),
                ("Cambria", 0.50),
                ("Comic Sans MS", 0.53),
                ("Consolas", 0.56),
                ("Courier New", 0.61),
                ("Georgia", 0.51),
                ("Impact", 0.43),
                ("Lucida Console", 0.59),
                ("Segoe UI", 0.49),
                ("Tahoma", 0.50),
                ("Times New Roman", 0.44),
                ("Trebuchet MS", 0.52),
                ("Verdana", 0.54),
            ],
            canvas: Some(CanvasQuirks {
                antialias_bias: 8,
                glyph_seed: 0x47a3,
                ..CanvasQuirks::default()
            }),
            audio: Some(AudioQuirks {
                sample_rate: 44_100,
                tone_bias: 1.0,
            }),
            plugins: vec![
                "Chrome PDF Viewer".into(),
                "Chromium PDF Viewer".into(),
                "PDF Viewer".into(),
            ],
            connection: Some(ConnectionInfo {
                effective_type: Some("4g".into()),
                downlink: Some(10.0),
                rtt: Some(Duration::from_millis(50)),
            }),
        }
    }

    pub fn firefox_desktop() -> Self {
        Self {
            name: "firefox-desktop",
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".into(),
            platform: "Win64".into(),
            vendor: String::new(),
            languages: vec!["en-US".into(), "en".into(), "fr".into()],
            screen: Some(ScreenInfo {
                resolution: (1680, 1050),
                color_depth: 24,
                pixel_ratio: 1.0,
            }),
            cores: Some(12),
            device_memory: Some(16.0),
            max_touch_points: 0,
            webgl: Some(WebglInfo {
                vendor: "Mozilla".into(),
                renderer: "ANGLE (Intel(R) UHD Graphics 630)".into(),
                extensions: sorted_extensions([
                    "ANGLE_instanced_arrays",
                    "EXT_color_buffer_half_float",
                    "EXT_texture_filter_anisotropic",
                    "MOZ_debug",
                    "OES_element_index_uint",
                    "OES_texture_float_linear",
                    "WEBGL_debug_renderer_info",
                    "WEBGL_lose_context",
                ]),
            }),
            installed_fonts: vec![
                ("Arial", 0.48),
                ("Comic Sans MS", 0.53),
                ("Courier New", 0.61),
                ("DejaVu Sans", 0.53),
                ("Georgia", 0.51),
                ("Impact", 0.43),
                ("Tahoma", 0.50),
                ("Times New Roman", 0.44),
                ("Ubuntu", 0.50),
                ("Verdana", 0.54),
            ],
            canvas: Some(CanvasQuirks {
                antialias_bias: 14,
                glyph_seed: 0x91c2,
                ..CanvasQuirks::default()
            }),
            audio: Some(AudioQuirks {
                sample_rate: 48_000,
                tone_bias: 0.998,
            }),
            plugins: Vec::new(),
            connection: None,
        }
    }

    pub fn safari_mac() -> Self {
        Self {
            name: "safari-mac",
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15".into(),
            platform: "MacIntel".into(),
            vendor: "Apple Computer, Inc.".into(),
            languages: vec!["en-US".into(), "en".into()],
            screen: Some(ScreenInfo {
                resolution: (2560, 1600),
                color_depth: 30,
                pixel_ratio: 2.0,
            }),
            cores: Some(10),
            device_memory: None,
            max_touch_points: 0,
            webgl: Some(WebglInfo {
                vendor: "Apple".into(),
                renderer: "Apple GPU".into(),
                extensions: sorted_extensions([
                    "EXT_blend_minmax",
                    "EXT_texture_filter_anisotropic",
                    "OES_standard_derivatives",
                    "OES_texture_float",
                    "WEBGL_depth_texture",
                    "WEBGL_lose_context",
                ]),
            }),
            installed_fonts: vec![
                ("Arial", 0.48),
                ("Futura", 0.51),
                ("Geneva", 0.50),
                ("Gill Sans", 0.46),
                ("Helvetica", 0.49),
                ("Menlo", 0.58),
                ("Monaco", 0.59),
                ("SF Pro", 0.47),
                ("Times New Roman", 0.44),
            ],
            canvas: Some(CanvasQuirks {
                antialias_bias: 3,
                glyph_seed: 0x05af,
                ..CanvasQuirks::default()
            }),
            audio: Some(AudioQuirks {
                sample_rate: 44_100,
                tone_bias: 0.995,
            }),
            plugins: vec!["PDF Viewer".into()],
            connection: None,
        }
    }

    /// Minimal profile: no rendering stack, no fonts, no screen. Exercises
    /// every legitimately-absent signal path.
    pub fn headless() -> Self {
        Self {
            name: "headless",
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36".into(),
            platform: "Linux x86_64".into(),
            vendor: "Google Inc.".into(),
            languages: vec!["en-US".into()],
            screen: None,
            cores: None,
            device_memory: None,
            max_touch_points: 0,
            webgl: None,
            installed_fonts: Vec::new(),
            canvas: None,
            audio: None,
            plugins: Vec::new(),
            connection: None,
        }
    }
}

fn sorted_extensions<const N: usize>(names: [&str; N]) -> Vec<String> {
    let mut extensions: Vec<String> = names.iter().map(|name| name.to_string()).collect();
    extensions.sort();
    extensions
}

/// Default [`Environment`]: a device profile plus live host probes.
pub struct HostEnvironment {
    profile: DeviceProfile,
}

impl HostEnvironment {
    /// Pick a realistic desktop profile for this process.
    pub fn detect() -> Self {
        let profiles = [
            DeviceProfile::chrome_desktop(),
            DeviceProfile::firefox_desktop(),
            DeviceProfile::safari_mac(),
        ];
        let mut rng = rand::thread_rng();
        let profile = profiles
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(DeviceProfile::chrome_desktop);
        Self { profile }
    }

    pub fn with_profile(profile: DeviceProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }
}

impl Environment for HostEnvironment {
    fn screen(&self) -> Option<ScreenInfo> {
        self.profile.screen.clone()
    }

    fn agent(&self) -> Option<AgentInfo> {
        let language = std::env::var("LANG")
            .ok()
            .and_then(|raw| normalize_language(&raw))
            .or_else(|| self.profile.languages.first().cloned())?;
        Some(AgentInfo {
            user_agent: self.profile.user_agent.clone(),
            platform: self.profile.platform.clone(),
            vendor: self.profile.vendor.clone(),
            language,
            languages: self.profile.languages.clone(),
            cookies_enabled: true,
        })
    }

    fn hardware(&self) -> Option<HardwareInfo> {
        let concurrency = std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32)
            .or(self.profile.cores);
        Some(HardwareInfo {
            concurrency,
            device_memory: self.profile.device_memory,
            max_touch_points: self.profile.max_touch_points,
        })
    }

    fn timezone(&self) -> Option<TimezoneInfo> {
        let name = std::env::var("TZ")
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let offset_minutes = -(Local::now().offset().local_minus_utc() / 60);
        Some(TimezoneInfo {
            name,
            offset_minutes,
        })
    }

    fn canvas(&self) -> Option<CanvasQuirks> {
        self.profile.canvas.clone()
    }

    fn webgl(&self) -> Option<WebglInfo> {
        self.profile.webgl.clone()
    }

    fn audio(&self) -> Option<AudioQuirks> {
        self.profile.audio.clone()
    }

    fn fonts(&self) -> Option<FontOracle> {
        if self.profile.installed_fonts.is_empty() {
            return None;
        }
        Some(FontOracle::new(self.profile.installed_fonts.iter().copied()))
    }

    fn storage(&self) -> Option<StorageSupport> {
        Some(StorageSupport {
            persistent: persistent_round_trip(),
            scratch: scratch_round_trip(),
            database: database_round_trip(),
        })
    }

    fn features(&self) -> Option<FeatureInfo> {
        Some(FeatureInfo {
            automation_controlled: false,
            plugins: self.profile.plugins.clone(),
            touch_support: self.profile.max_touch_points > 0,
        })
    }

    fn connection(&self) -> Option<ConnectionInfo> {
        self.profile.connection.clone()
    }
}

/// "en_US.UTF-8" style locale to a BCP 47-ish tag.
fn normalize_language(raw: &str) -> Option<String> {
    let tag = raw.split('.').next()?.trim().replace('_', "-");
    (!tag.is_empty() && tag != "C" && tag != "POSIX").then_some(tag)
}

fn persistent_round_trip() -> bool {
    let path = std::env::temp_dir().join(format!("gatepass-probe-{}", std::process::id()));
    std::fs::write(&path, b"1")
        .and_then(|()| std::fs::remove_file(&path))
        .is_ok()
}

fn scratch_round_trip() -> bool {
    let mut scratch = Vec::with_capacity(1);
    scratch.push(1u8);
    scratch.pop() == Some(1)
}

fn database_round_trip() -> bool {
    let path = std::env::temp_dir().join(format!("gatepass-db-probe-{}", std::process::id()));
    std::fs::create_dir(&path)
        .and_then(|()| std::fs::remove_dir(&path))
        .is_ok()
}
