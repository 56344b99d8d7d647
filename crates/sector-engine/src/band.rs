//! Band label normalization
//!
//! Operators write band columns every way imaginable: `LTE1800`, `L1800`,
//! `1800 MHz`, `B3_1800`, `2x1800`. The canonical [`BandKey`] is the first run
//! of 3–4 consecutive ASCII digits in the label. Runs of other lengths are
//! skipped, so `2x1800` keys as `1800` and `B3 1800` as `1800`. A label with no
//! such run maps to [`UNKNOWN_BAND`] instead of failing the record.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Key for labels that carry no recognizable frequency
pub const UNKNOWN_BAND: &str = "UNKNOWN";

/// Sort position for labels without any digits (after every real band)
pub const NO_FREQUENCY: u32 = 99_999;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid digit regex"));

/// Canonical band key, e.g. `"1800"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandKey(String);

impl BandKey {
    pub fn unknown() -> Self {
        Self(UNKNOWN_BAND.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_BAND
    }

    /// Numeric frequency of this key, [`NO_FREQUENCY`] for the sentinel
    pub fn frequency(&self) -> u32 {
        numeric_frequency(&self.0)
    }
}

impl From<&str> for BandKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for BandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the canonical band key from free-form text
pub fn normalize(raw: &str) -> BandKey {
    DIGIT_RUN
        .find_iter(raw)
        .map(|m| m.as_str())
        .find(|run| (3..=4).contains(&run.len()))
        .map(BandKey::from)
        .unwrap_or_else(BandKey::unknown)
}

/// Largest integer appearing in a label, used to stack bands low→high.
///
/// `LTE1800` → 1800, `B3_2100` → 2100, `n/a` → [`NO_FREQUENCY`].
pub fn numeric_frequency(raw: &str) -> u32 {
    DIGIT_RUN
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(NO_FREQUENCY)
}

/// Memoizing wrapper around [`normalize`].
///
/// Safe to share between workers; the cache only ever grows and every entry
/// is the pure result of `normalize`, so lookups never disagree.
#[derive(Debug, Default)]
pub struct BandNormalizer {
    cache: RwLock<HashMap<String, BandKey>>,
}

impl BandNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, raw: &str) -> BandKey {
        let raw = raw.trim();
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(key) = cache.get(raw) {
                return key.clone();
            }
        }
        let key = normalize(raw);
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(raw.to_string())
            .or_insert_with(|| key.clone());
        key
    }

    /// Number of distinct raw labels seen so far
    pub fn cached_labels(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_labels() {
        assert_eq!(normalize("LTE_1800_MHz").as_str(), "1800");
        assert_eq!(normalize("1800 MHz").as_str(), "1800");
        assert_eq!(normalize("1800mhz").as_str(), "1800");
        assert_eq!(normalize("L900").as_str(), "900");
        assert_eq!(normalize("700").as_str(), "700");
        assert_eq!(normalize("NR2600").as_str(), "2600");
        assert_eq!(normalize("  2300 ").as_str(), "2300");
    }

    #[test]
    fn test_short_runs_are_skipped() {
        assert_eq!(normalize("2x1800").as_str(), "1800");
        assert_eq!(normalize("B3 1800").as_str(), "1800");
        assert_eq!(normalize("B1_2100_B3_1800").as_str(), "2100");
    }

    #[test]
    fn test_unknown_sentinel() {
        assert!(normalize("").is_unknown());
        assert!(normalize("GSM").is_unknown());
        assert!(normalize("B3").is_unknown());
        assert!(normalize("18000").is_unknown());
        assert_eq!(normalize("n/a").as_str(), UNKNOWN_BAND);
    }

    #[test]
    fn test_numeric_frequency() {
        assert_eq!(numeric_frequency("LTE1800"), 1800);
        assert_eq!(numeric_frequency("B3_2100"), 2100);
        assert_eq!(numeric_frequency("GSM"), NO_FREQUENCY);
        assert_eq!(BandKey::unknown().frequency(), NO_FREQUENCY);
        assert_eq!(BandKey::from("900").frequency(), 900);
    }

    #[test]
    fn test_normalizer_caches_per_label() {
        let normalizer = BandNormalizer::new();
        let a = normalizer.normalize("LTE1800");
        let b = normalizer.normalize("LTE1800");
        let c = normalizer.normalize(" LTE1800 ");
        let d = normalizer.normalize("1800MHz");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert_eq!(normalizer.cached_labels(), 2);
    }
}
