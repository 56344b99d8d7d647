//! Site records and column mapping
//!
//! Rows arrive as plain strings under a header. A [`ColumnMapping`] names the
//! source column for each role; resolving it against the header is the
//! run-level structural check, extracting a [`SiteRecord`] from a row is the
//! per-record check.

use crate::pipeline::Mode;
use crate::{Result, SectorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MANUAL_RADIUS_M: f64 = 500.0;
pub const DEFAULT_MANUAL_BEAMWIDTH_DEG: f64 = 65.0;

/// One raw source row
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Zero-based data row index (header excluded)
    pub row: usize,
    pub values: Vec<String>,
}

impl RawRow {
    pub fn new(row: usize, values: Vec<String>) -> Self {
        Self { row, values }
    }
}

/// Why a record was skipped
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("missing value for {0}")]
    MissingField(String),
    #[error("cannot parse {field} value {value:?}")]
    Unparsable { field: String, value: String },
    #[error("malformed row: {0}")]
    Malformed(String),
    #[error("{0}")]
    Invalid(String),
}

impl From<SectorError> for SkipReason {
    fn from(err: SectorError) -> Self {
        SkipReason::Invalid(err.to_string())
    }
}

/// A skipped record, tagged with its source row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub reason: SkipReason,
}

/// Source column per role. `radius`/`beamwidth` fall back to manual values
/// when unmapped; `band` and `pci` are required only by their mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub id: String,
    pub lat: String,
    pub lon: String,
    pub azimuth: String,
    #[serde(default)]
    pub radius: Option<String>,
    #[serde(default)]
    pub beamwidth: Option<String>,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub pci: Option<String>,
}

impl ColumnMapping {
    pub fn new(id: &str, lat: &str, lon: &str, azimuth: &str) -> Self {
        Self {
            id: id.to_string(),
            lat: lat.to_string(),
            lon: lon.to_string(),
            azimuth: azimuth.to_string(),
            radius: None,
            beamwidth: None,
            band: None,
            pci: None,
        }
    }

    pub fn with_radius(mut self, column: &str) -> Self {
        self.radius = Some(column.to_string());
        self
    }

    pub fn with_beamwidth(mut self, column: &str) -> Self {
        self.beamwidth = Some(column.to_string());
        self
    }

    pub fn with_band(mut self, column: &str) -> Self {
        self.band = Some(column.to_string());
        self
    }

    pub fn with_pci(mut self, column: &str) -> Self {
        self.pci = Some(column.to_string());
        self
    }

    /// Resolve column names to header positions.
    ///
    /// Fails when a mapped column is absent from the header, or when the
    /// mode's thematic column (band or PCI) is not mapped at all.
    pub fn resolve(&self, headers: &[String], mode: Mode) -> Result<ResolvedColumns> {
        let find = |role: &'static str, column: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == column.trim())
                .ok_or_else(|| SectorError::MissingColumn {
                    role,
                    column: column.to_string(),
                })
        };
        let find_opt = |role: &'static str, column: &Option<String>| -> Result<Option<usize>> {
            column.as_deref().map(|c| find(role, c)).transpose()
        };

        let resolved = ResolvedColumns {
            id: find("id", &self.id)?,
            lat: find("latitude", &self.lat)?,
            lon: find("longitude", &self.lon)?,
            azimuth: find("azimuth", &self.azimuth)?,
            radius: find_opt("radius", &self.radius)?,
            beamwidth: find_opt("beamwidth", &self.beamwidth)?,
            band: find_opt("band", &self.band)?,
            pci: find_opt("pci", &self.pci)?,
        };

        match mode {
            Mode::StyleByBand if resolved.band.is_none() => Err(SectorError::UnmappedColumn("band")),
            Mode::AuditPci(_) if resolved.pci.is_none() => Err(SectorError::UnmappedColumn("pci")),
            _ => Ok(resolved),
        }
    }
}

/// Scalars used when radius/beamwidth columns are not mapped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualFallback {
    pub radius_m: f64,
    pub beamwidth_deg: f64,
}

impl Default for ManualFallback {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_MANUAL_RADIUS_M,
            beamwidth_deg: DEFAULT_MANUAL_BEAMWIDTH_DEG,
        }
    }
}

/// Where a record's radius came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiusSource {
    Column,
    Manual,
}

/// One validated input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub row: usize,
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub azimuth_deg: f64,
    pub radius_m: f64,
    pub radius_source: RadiusSource,
    pub beamwidth_deg: f64,
    pub band_raw: Option<String>,
    pub pci: Option<i64>,
}

/// Header positions for each mapped role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub id: usize,
    pub lat: usize,
    pub lon: usize,
    pub azimuth: usize,
    pub radius: Option<usize>,
    pub beamwidth: Option<usize>,
    pub band: Option<usize>,
    pub pci: Option<usize>,
}

fn cell<'a>(raw: &'a RawRow, index: usize, field: &str) -> std::result::Result<&'a str, SkipReason> {
    match raw.values.get(index).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SkipReason::MissingField(field.to_string())),
    }
}

fn number(raw: &RawRow, index: usize, field: &str) -> std::result::Result<f64, SkipReason> {
    let text = cell(raw, index, field)?;
    text.parse::<f64>().map_err(|_| SkipReason::Unparsable {
        field: field.to_string(),
        value: text.to_string(),
    })
}

/// PCI cells sometimes come out of spreadsheets as `"12.0"`; whole floats are accepted.
fn integer(raw: &RawRow, index: usize, field: &str) -> std::result::Result<i64, SkipReason> {
    let text = cell(raw, index, field)?;
    if let Ok(v) = text.parse::<i64>() {
        return Ok(v);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(SkipReason::Unparsable {
            field: field.to_string(),
            value: text.to_string(),
        }),
    }
}

impl ResolvedColumns {
    /// Extract a record, or the reason it has to be skipped.
    ///
    /// Only presence and parseability are checked here; ranges are checked by
    /// the geometry builder and the PCI classifier.
    pub fn extract(
        &self,
        raw: &RawRow,
        fallback: &ManualFallback,
        mode: Mode,
    ) -> std::result::Result<SiteRecord, SkipRecord> {
        let id = raw.values.get(self.id).map(|v| v.trim().to_string());
        let skip = |reason: SkipReason| SkipRecord {
            row: raw.row,
            id: id.clone().filter(|v| !v.is_empty()),
            reason,
        };

        let id_value = cell(raw, self.id, "id").map_err(skip)?.to_string();
        let lat = number(raw, self.lat, "latitude").map_err(skip)?;
        let lon = number(raw, self.lon, "longitude").map_err(skip)?;
        let azimuth_deg = number(raw, self.azimuth, "azimuth").map_err(skip)?;

        let (radius_m, radius_source) = match self.radius {
            Some(i) => (number(raw, i, "radius").map_err(skip)?, RadiusSource::Column),
            None => (fallback.radius_m, RadiusSource::Manual),
        };
        let beamwidth_deg = match self.beamwidth {
            Some(i) => number(raw, i, "beamwidth").map_err(skip)?,
            None => fallback.beamwidth_deg,
        };

        let band_raw = match (self.band, mode) {
            (Some(i), Mode::StyleByBand) => Some(cell(raw, i, "band").map_err(skip)?.to_string()),
            (Some(i), _) => raw.values.get(i).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            (None, _) => None,
        };
        let pci = match (self.pci, mode) {
            (Some(i), Mode::AuditPci(_)) => Some(integer(raw, i, "pci").map_err(skip)?),
            (Some(i), _) => integer(raw, i, "pci").ok(),
            (None, _) => None,
        };

        Ok(SiteRecord {
            row: raw.row,
            id: id_value,
            lat,
            lon,
            azimuth_deg,
            radius_m,
            radius_source,
            beamwidth_deg,
            band_raw,
            pci,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PciModulo;

    fn headers() -> Vec<String> {
        ["Site", "Lat", "Lon", "Azi", "Band", "PCI", "Beam"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row(i: usize, values: &[&str]) -> RawRow {
        RawRow::new(i, values.iter().map(|s| s.to_string()).collect())
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping::new("Site", "Lat", "Lon", "Azi")
            .with_band("Band")
            .with_pci("PCI")
            .with_beamwidth("Beam")
    }

    #[test]
    fn test_resolve_positions() {
        let cols = mapping().resolve(&headers(), Mode::StyleByBand).unwrap();
        assert_eq!(cols.id, 0);
        assert_eq!(cols.band, Some(4));
        assert_eq!(cols.pci, Some(5));
        assert_eq!(cols.beamwidth, Some(6));
        assert_eq!(cols.radius, None);
    }

    #[test]
    fn test_resolve_missing_column_is_structural() {
        let mapping = mapping().with_radius("Radius");
        let err = mapping.resolve(&headers(), Mode::StyleByBand).unwrap_err();
        assert!(matches!(err, SectorError::MissingColumn { role: "radius", .. }));
    }

    #[test]
    fn test_resolve_requires_mode_column() {
        let mapping = ColumnMapping::new("Site", "Lat", "Lon", "Azi");
        assert!(matches!(
            mapping.resolve(&headers(), Mode::StyleByBand),
            Err(SectorError::UnmappedColumn("band"))
        ));
        assert!(matches!(
            mapping.resolve(&headers(), Mode::AuditPci(PciModulo::Rs)),
            Err(SectorError::UnmappedColumn("pci"))
        ));
    }

    #[test]
    fn test_extract_with_fallback_radius() {
        let cols = mapping().resolve(&headers(), Mode::StyleByBand).unwrap();
        let record = cols
            .extract(
                &row(3, &["JKT001", "-6.2", "106.8", "120", "LTE1800", "12.0", "65"]),
                &ManualFallback::default(),
                Mode::StyleByBand,
            )
            .unwrap();
        assert_eq!(record.row, 3);
        assert_eq!(record.id, "JKT001");
        assert_eq!(record.radius_m, DEFAULT_MANUAL_RADIUS_M);
        assert_eq!(record.radius_source, RadiusSource::Manual);
        assert_eq!(record.band_raw.as_deref(), Some("LTE1800"));
        assert_eq!(record.pci, Some(12));
    }

    #[test]
    fn test_extract_skip_reasons() {
        let cols = mapping().resolve(&headers(), Mode::AuditPci(PciModulo::Pss)).unwrap();
        let fallback = ManualFallback::default();
        let mode = Mode::AuditPci(PciModulo::Pss);

        let skip = cols
            .extract(&row(0, &["A", "x", "106", "0", "", "1", "65"]), &fallback, mode)
            .unwrap_err();
        assert_eq!(skip.id.as_deref(), Some("A"));
        assert!(matches!(skip.reason, SkipReason::Unparsable { .. }));

        let skip = cols
            .extract(&row(1, &["B", "1", "106", "0", "L900", "", "65"]), &fallback, mode)
            .unwrap_err();
        assert_eq!(skip.reason, SkipReason::MissingField("pci".to_string()));

        let skip = cols
            .extract(&row(2, &["C", "1", "106"]), &fallback, mode)
            .unwrap_err();
        assert_eq!(skip.reason, SkipReason::MissingField("azimuth".to_string()));

        let skip = cols
            .extract(&row(3, &["D", "1", "106", "0", "L900", "1.5", "65"]), &fallback, mode)
            .unwrap_err();
        assert!(matches!(skip.reason, SkipReason::Unparsable { .. }));
    }

    #[test]
    fn test_band_optional_outside_band_mode() {
        let cols = mapping().resolve(&headers(), Mode::AuditPci(PciModulo::Rs)).unwrap();
        let record = cols
            .extract(
                &row(0, &["A", "1", "2", "3", "", "7", "65"]),
                &ManualFallback::default(),
                Mode::AuditPci(PciModulo::Rs),
            )
            .unwrap();
        assert_eq!(record.band_raw, None);
        assert_eq!(record.pci, Some(7));
    }
}
