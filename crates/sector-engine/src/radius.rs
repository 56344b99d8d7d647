//! Per-band radius scaling
//!
//! Several bands on one site usually share the same nominal radius, so their
//! wedges would sit exactly on top of each other. The plan gives each band a
//! scale factor in first-seen order:
//!
//! ```text
//! factor(rank) = max(1.0 - rank·d, min_fraction)
//! ```
//!
//! The band seen first in the file (usually the most prevalent one) renders
//! largest. The plan is computed once per run, before any geometry, and is
//! read-only afterwards.

use crate::{BandKey, Result, SectorError};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_DECREMENT_FRACTION: f64 = 0.15;
pub const DEFAULT_MIN_RADIUS_FRACTION: f64 = 0.25;

/// Immutable band → radius scale factor mapping
#[derive(Debug, Clone, Serialize)]
pub struct RadiusPlan {
    order: Vec<BandKey>,
    factors: HashMap<BandKey, f64>,
}

impl RadiusPlan {
    /// Build the plan from band keys in first-seen order. Duplicates keep
    /// the rank of their first occurrence.
    pub fn build(keys: &[BandKey], decrement_fraction: f64, min_fraction: f64) -> Result<Self> {
        if !(decrement_fraction > 0.0 && decrement_fraction < 1.0) {
            return Err(SectorError::Configuration(format!(
                "base_decrement_fraction must be in (0, 1), got {}",
                decrement_fraction
            )));
        }
        if !(min_fraction > 0.0 && min_fraction <= 1.0) {
            return Err(SectorError::Configuration(format!(
                "min_radius_fraction must be in (0, 1], got {}",
                min_fraction
            )));
        }

        let mut order = Vec::new();
        let mut factors = HashMap::new();
        for key in keys {
            if factors.contains_key(key) {
                continue;
            }
            let rank = order.len();
            let factor = (1.0 - rank as f64 * decrement_fraction).max(min_fraction);
            debug!("Radius plan: band {} rank {} factor {:.3}", key, rank, factor);
            factors.insert(key.clone(), factor);
            order.push(key.clone());
        }

        Ok(Self { order, factors })
    }

    /// Plan that leaves every radius untouched
    pub fn empty() -> Self {
        Self {
            order: Vec::new(),
            factors: HashMap::new(),
        }
    }

    pub fn factor(&self, key: &BandKey) -> Option<f64> {
        self.factors.get(key).copied()
    }

    /// Scale `base_m` by the band's factor; unplanned keys keep the base radius
    pub fn scaled_radius(&self, key: &BandKey, base_m: f64) -> f64 {
        base_m * self.factor(key).unwrap_or(1.0)
    }

    /// Rank of a band in the plan (0 = largest)
    pub fn rank(&self, key: &BandKey) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }

    /// `(key, factor)` pairs in rank order
    pub fn iter(&self) -> impl Iterator<Item = (&BandKey, f64)> {
        self.order.iter().map(move |k| (k, self.factors[k]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
