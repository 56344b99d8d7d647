//! Site Sector Engine
//!
//! Turns cell-site rows (position, azimuth, beamwidth, radius, band, PCI)
//! into styled sector wedge polygons for map export.
//!
//! # Pipeline
//!
//! ```text
//! Init → Validate → BuildRadiusPlan (band mode) → GenerateGeometry → AssignStyle → Emit
//! ```
//!
//! | Component      | Module       | Role |
//! |----------------|--------------|------|
//! | GeometryBuilder| [`geometry`] | point + bearing + radius + beamwidth → closed ring |
//! | BandNormalizer | [`band`]     | free-form band text → canonical [`BandKey`] |
//! | RadiusAllocator| [`radius`]   | distinct band keys → per-band radius scale factor |
//! | PciAudit       | [`pci`]      | `pci mod 3` / `pci mod 6` interference group |
//! | ThematicStyler | [`style`]    | deterministic color per key, canonical [`Legend`] |
//! | SectorPipeline | [`pipeline`] | chunked, parallel, cancellable orchestration |
//!
//! The engine colors sectors by PCI group; it does not decide which groups
//! are geographically adjacent. Conflict spotting is left to whoever looks
//! at the map.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod band;
pub mod config;
pub mod geometry;
pub mod pci;
pub mod pipeline;
pub mod radius;
pub mod record;
pub mod style;

pub use band::{BandKey, BandNormalizer, UNKNOWN_BAND};
pub use config::EngineConfig;
pub use geometry::{build_wedge, LatLon, Wedge};
pub use pci::{classify, PciGroup, PciModulo};
pub use pipeline::{
    CancellationToken, MemorySource, Mode, RecordSource, RunOutput, RunReport, RunSummary,
    SectorPipeline, SectorSink,
};
pub use radius::RadiusPlan;
pub use record::{ColumnMapping, ManualFallback, RawRow, SiteRecord, SkipReason, SkipRecord};
pub use style::{Legend, LegendEntry, Rgb, Rgba, ThematicStyler};

#[derive(Error, Debug)]
pub enum SectorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid PCI modulo {0}: expected 3 or 6")]
    InvalidModulo(u32),
    #[error("PCI must be non-negative, got {0}")]
    NegativePci(i64),
    #[error("Radius must be positive, got {0} m")]
    InvalidRadius(f64),
    #[error("Beamwidth must be positive, got {0}°")]
    InvalidBeamwidth(f64),
    #[error("Azimuth must be finite, got {0}")]
    InvalidAzimuth(f64),
    #[error("Latitude out of range [-90, 90]: {0}")]
    LatitudeOutOfRange(f64),
    #[error("Longitude out of range [-180, 180]: {0}")]
    LongitudeOutOfRange(f64),
    #[error("Required {role} column {column:?} not found in source")]
    MissingColumn { role: &'static str, column: String },
    #[error("No {0} column mapped; required by the selected mode")]
    UnmappedColumn(&'static str),
    #[error("Estimated output of {estimated} bytes exceeds limit of {limit} bytes")]
    Capacity { estimated: u64, limit: u64 },
    #[error("Run cancelled after {processed} records")]
    Cancelled { processed: usize },
    #[error("Record source error: {0}")]
    Source(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SectorError>;

/// The thematic key a sector is colored by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorKey {
    Band(BandKey),
    PciGroup(PciGroup),
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorKey::Band(key) => write!(f, "{}", key),
            ColorKey::PciGroup(group) => write!(f, "{}", group),
        }
    }
}

/// One emitted sector: wedge ring plus the style it was assigned.
///
/// Produced only by [`SectorPipeline`]; exporters read it, nothing writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledSector {
    /// Zero-based data row index in the source (header excluded)
    pub row: usize,
    pub id: String,
    pub apex: LatLon,
    /// Closed ring: first vertex == last vertex
    pub ring: Vec<LatLon>,
    pub color_key: ColorKey,
    pub fill: Rgba,
    pub azimuth_deg: f64,
    /// Radius actually used, after any radius-plan scaling
    pub radius_m: f64,
    pub beamwidth_deg: f64,
    /// Source row values, in source header order
    pub attributes: Vec<String>,
}

impl StyledSector {
    pub fn is_omni(&self) -> bool {
        self.beamwidth_deg >= 360.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_key_display() {
        assert_eq!(ColorKey::Band(BandKey::from("1800")).to_string(), "1800");
        assert_eq!(ColorKey::PciGroup(PciGroup::new(4)).to_string(), "4");
    }

    #[test]
    fn test_color_key_serializes_untagged() {
        let band = serde_json::to_value(ColorKey::Band(BandKey::from("900"))).unwrap();
        assert_eq!(band, serde_json::json!("900"));
        let group = serde_json::to_value(ColorKey::PciGroup(PciGroup::new(2))).unwrap();
        assert_eq!(group, serde_json::json!(2));
    }
}
