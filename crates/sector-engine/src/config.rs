//! Engine configuration
//!
//! Loaded from JSON (every field optional, missing fields take the defaults
//! below) and validated once before a run starts. Any failure here is a
//! run-level [`SectorError::Configuration`].

use crate::geometry::{DEFAULT_ARC_SEGMENTS, MAX_ARC_SEGMENTS, MIN_ARC_SEGMENTS};
use crate::radius::{DEFAULT_DECREMENT_FRACTION, DEFAULT_MIN_RADIUS_FRACTION};
use crate::style::{Rgb, DEFAULT_BAND_PALETTE, DEFAULT_PCI_PALETTE};
use crate::{Result, SectorError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub const DEFAULT_BAND_OPACITY: f64 = 0.50;
pub const DEFAULT_PCI_OPACITY: f64 = 0.60;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Arc steps per wedge (tessellation density)
    pub arc_segments: usize,
    /// Radius decrement per band rank, in (0, 1)
    pub base_decrement_fraction: f64,
    /// Lowest radius scale factor, in (0, 1]
    pub min_radius_fraction: f64,
    /// Colors band keys cycle through, in claim order
    pub band_palette: Vec<Rgb>,
    /// Colors for PCI groups 0..6, indexed by group id
    pub pci_palette: Vec<Rgb>,
    pub band_opacity: f64,
    pub pci_opacity: f64,
    /// Worker threads; 0 uses every available core
    pub worker_count: usize,
    /// Records handed to the worker pool per batch
    pub chunk_size: usize,
    /// Refuse exports whose estimated size exceeds this many bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arc_segments: DEFAULT_ARC_SEGMENTS,
            base_decrement_fraction: DEFAULT_DECREMENT_FRACTION,
            min_radius_fraction: DEFAULT_MIN_RADIUS_FRACTION,
            band_palette: DEFAULT_BAND_PALETTE.to_vec(),
            pci_palette: DEFAULT_PCI_PALETTE.to_vec(),
            band_opacity: DEFAULT_BAND_OPACITY,
            pci_opacity: DEFAULT_PCI_OPACITY,
            worker_count: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_output_bytes: None,
        }
    }
}

impl EngineConfig {
    /// Load overrides from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading engine config from {:?}", path);
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SectorError::Configuration(msg));

        if !(MIN_ARC_SEGMENTS..=MAX_ARC_SEGMENTS).contains(&self.arc_segments) {
            return fail(format!(
                "arc_segments must be in {}..={}, got {}",
                MIN_ARC_SEGMENTS, MAX_ARC_SEGMENTS, self.arc_segments
            ));
        }
        if !(self.base_decrement_fraction > 0.0 && self.base_decrement_fraction < 1.0) {
            return fail(format!(
                "base_decrement_fraction must be in (0, 1), got {}",
                self.base_decrement_fraction
            ));
        }
        if !(self.min_radius_fraction > 0.0 && self.min_radius_fraction <= 1.0) {
            return fail(format!(
                "min_radius_fraction must be in (0, 1], got {}",
                self.min_radius_fraction
            ));
        }
        if self.band_palette.is_empty() {
            return fail("band_palette is empty".to_string());
        }
        if self.pci_palette.len() < 6 {
            return fail(format!(
                "pci_palette needs 6 colors, got {}",
                self.pci_palette.len()
            ));
        }
        for (name, value) in [("band_opacity", self.band_opacity), ("pci_opacity", self.pci_opacity)] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        if self.chunk_size == 0 {
            return fail("chunk_size must be positive".to_string());
        }
        Ok(())
    }

    /// Worker threads to spawn: the configured count, capped at the core count
    pub fn resolved_workers(&self) -> usize {
        let cores = num_cpus::get().max(1);
        match self.worker_count {
            0 => cores,
            n => n.min(cores),
        }
    }
}
