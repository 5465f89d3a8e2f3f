//! Font detection probe.
//!
//! Classic width-differencing detection: measure a probe string against the
//! three generic baseline families, then re-measure with each candidate
//! family stacked in front of a baseline. A candidate is installed when its
//! width differs from at least one baseline it would otherwise fall back to.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Probe string whose glyph widths separate families well.
const PROBE_STRING: &str = "mmmmmmmmmmlli";
/// Probe size in pixels.
const PROBE_SIZE: f64 = 72.0;

const BASELINE_FAMILIES: [&str; 3] = ["monospace", "sans-serif", "serif"];

const CANDIDATE_FONTS: [&str; 24] = [
    "Arial",
    "Arial Black",
    "Calibri",
    "Cambria",
    "Comic Sans MS",
    "Consolas",
    "Courier New",
    "Georgia",
    "Helvetica",
    "Impact",
    "Lucida Console",
    "Monaco",
    "Segoe UI",
    "Tahoma",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
    "Futura",
    "Geneva",
    "Gill Sans",
    "Menlo",
    "SF Pro",
    "DejaVu Sans",
    "Ubuntu",
];

/// Advance-width factors for the generic fallback families.
static GENERIC_FACTORS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([("monospace", 0.60), ("sans-serif", 0.52), ("serif", 0.55)])
});

/// Text measurement backed by the environment's installed font table.
#[derive(Debug, Clone, Default)]
pub struct FontOracle {
    installed: HashMap<String, f64>,
}

impl FontOracle {
    pub fn new<I, S>(installed: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            installed: installed
                .into_iter()
                .map(|(name, factor)| (name.into(), factor))
                .collect(),
        }
    }

    /// Width of `text` at `size` for a `family` falling back to `fallback`.
    /// An uninstalled family measures exactly like its fallback, which is
    /// what the differencing check exploits.
    pub fn measure(&self, family: Option<&str>, fallback: &str, text: &str, size: f64) -> f64 {
        let factor = family
            .and_then(|name| self.installed.get(name).copied())
            .unwrap_or_else(|| GENERIC_FACTORS.get(fallback).copied().unwrap_or(0.5));
        factor * size * text.chars().count() as f64
    }
}

/// Detect which candidate families the environment actually has. Sorted.
pub fn detect_fonts(oracle: &FontOracle) -> Vec<String> {
    let mut base_widths = HashMap::new();
    for family in BASELINE_FAMILIES {
        base_widths.insert(
            family,
            oracle.measure(None, family, PROBE_STRING, PROBE_SIZE),
        );
    }

    let mut detected: Vec<String> = CANDIDATE_FONTS
        .iter()
        .filter(|font| {
            BASELINE_FAMILIES.iter().any(|baseline| {
                oracle.measure(Some(font), baseline, PROBE_STRING, PROBE_SIZE)
                    != base_widths[baseline]
            })
        })
        .map(|font| font.to_string())
        .collect();
    detected.sort();
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_installed_candidates_only() {
        let oracle = FontOracle::new([("Arial", 0.48), ("Menlo", 0.61), ("Wingdings", 0.47)]);
        let detected = detect_fonts(&oracle);
        assert_eq!(detected, vec!["Arial".to_string(), "Menlo".to_string()]);
    }

    #[test]
    fn empty_oracle_detects_nothing() {
        assert!(detect_fonts(&FontOracle::default()).is_empty());
    }

    #[test]
    fn result_is_sorted() {
        let oracle = FontOracle::new([("Verdana", 0.51), ("Calibri", 0.47), ("Georgia", 0.5)]);
        let detected = detect_fonts(&oracle);
        let mut sorted = detected.clone();
        sorted.sort();
        assert_eq!(detected, sorted);
    }

    #[test]
    fn font_matching_a_baseline_width_still_detected_via_other_baselines() {
        // Matches the monospace factor exactly, but differs from the other
        // two baselines, so the differencing check still finds it.
        let oracle = FontOracle::new([("Consolas", 0.60)]);
        assert_eq!(detect_fonts(&oracle), vec!["Consolas".to_string()]);
    }
}
