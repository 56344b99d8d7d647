//! Sector Export
//!
//! Writers for styled sector output. Every writer reads colors from the run's
//! canonical [`Legend`]; none of them recompute styling, so a QGIS style file
//! and a KML written from the same run always agree.
//!
//! | Format  | Module      | Contents |
//! |---------|-------------|----------|
//! | GeoJSON | [`geojson_export`] | polygon FeatureCollection, simplestyle fill properties, legend foreign member |
//! | KML     | [`kml_export`] | shared styles per legend key, HTML legend, site labels, ExtendedData |
//! | QML     | [`qml_export`] | QGIS categorized renderer companion style |
//! | Legend  | this module | canonical legend as JSON |

use sector_engine::{Legend, RunReport, SectorError, StyledSector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub mod geojson_export;
pub mod kml_export;
pub mod qml_export;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Engine(#[from] SectorError),
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    GeoJson,
    Kml,
    Qml,
    Legend,
}

impl ExportFormat {
    /// File name suffix, appended to the output stem
    pub fn suffix(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "geojson",
            ExportFormat::Kml => "kml",
            ExportFormat::Qml => "qml",
            ExportFormat::Legend => "legend.json",
        }
    }

    /// `base` with this format's suffix, e.g. `out/sectors` → `out/sectors.kml`
    pub fn path_for(&self, base: &Path) -> PathBuf {
        base.with_extension(self.suffix())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(ExportFormat::GeoJson),
            "kml" => Ok(ExportFormat::Kml),
            "qml" => Ok(ExportFormat::Qml),
            "legend" => Ok(ExportFormat::Legend),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::GeoJson => "geojson",
            ExportFormat::Kml => "kml",
            ExportFormat::Qml => "qml",
            ExportFormat::Legend => "legend",
        };
        f.write_str(name)
    }
}

/// Everything a writer needs from one run
#[derive(Debug, Clone, Copy)]
pub struct ExportBundle<'a> {
    pub sectors: &'a [StyledSector],
    pub report: &'a RunReport,
}

impl<'a> ExportBundle<'a> {
    pub fn new(sectors: &'a [StyledSector], report: &'a RunReport) -> Self {
        Self { sectors, report }
    }

    pub fn legend(&self) -> &'a Legend {
        &self.report.legend
    }

    pub fn headers(&self) -> &'a [String] {
        &self.report.headers
    }
}

/// Sectors in draw order: legend rank first (larger bands and lower PCI
/// groups underneath), then source row.
pub fn stacking_order<'a>(sectors: &'a [StyledSector], legend: &Legend) -> Vec<&'a StyledSector> {
    let mut ordered: Vec<&StyledSector> = sectors.iter().collect();
    ordered.sort_by_key(|s| (legend.rank(&s.color_key).unwrap_or(usize::MAX), s.row));
    ordered
}

/// Write the canonical legend as pretty JSON
pub fn write_legend<W: Write>(legend: &Legend, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, legend)?;
    Ok(())
}

/// Write one format to `path`, refusing when the run's estimated size
/// exceeds `max_bytes`
pub fn export_to_path(
    format: ExportFormat,
    bundle: &ExportBundle<'_>,
    path: &Path,
    max_bytes: Option<u64>,
) -> Result<()> {
    if format != ExportFormat::Legend {
        bundle.report.summary.check_capacity(max_bytes)?;
    }
    info!("Writing {} to {:?}", format, path);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::GeoJson => geojson_export::write_geojson(bundle, &mut writer)?,
        ExportFormat::Kml => kml_export::write_kml(bundle, &mut writer)?,
        ExportFormat::Qml => qml_export::write_qml(bundle.legend(), &mut writer)?,
        ExportFormat::Legend => write_legend(bundle.legend(), &mut writer)?,
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    use sector_engine::{
        ColumnMapping, EngineConfig, ManualFallback, MemorySource, Mode, PciModulo, RunOutput,
        SectorPipeline,
    };

    pub fn band_run() -> RunOutput {
        let source = MemorySource::from_strs(
            &["Site", "Lat", "Lon", "Azimuth", "Band", "PCI"],
            &[
                vec!["JKT<1>", "-6.2", "106.8", "0", "LTE1800", "10"],
                vec!["JKT<1>", "-6.2", "106.8", "120", "L900", "11"],
                vec!["BDG&2", "-6.9", "107.6", "240", "LTE1800", "12"],
            ],
        );
        let mapping = ColumnMapping::new("Site", "Lat", "Lon", "Azimuth")
            .with_band("Band")
            .with_pci("PCI");
        let config = EngineConfig {
            worker_count: 1,
            ..Default::default()
        };
        SectorPipeline::new(config, Mode::StyleByBand, mapping, ManualFallback::default())
            .unwrap()
            .collect(&source)
            .unwrap()
    }

    pub fn pci_run() -> RunOutput {
        let source = MemorySource::from_strs(
            &["Site", "Lat", "Lon", "Azimuth", "PCI"],
            &[
                vec!["A", "1.0", "1.0", "0", "7"],
                vec!["B", "1.1", "1.0", "90", "9"],
            ],
        );
        let mapping = ColumnMapping::new("Site", "Lat", "Lon", "Azimuth").with_pci("PCI");
        let config = EngineConfig {
            worker_count: 1,
            ..Default::default()
        };
        SectorPipeline::new(config, Mode::AuditPci(PciModulo::Rs), mapping, ManualFallback::default())
            .unwrap()
            .collect(&source)
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_parsing() {
        assert_eq!("GeoJSON".parse::<ExportFormat>().unwrap(), ExportFormat::GeoJson);
        assert_eq!("kml".parse::<ExportFormat>().unwrap(), ExportFormat::Kml);
        assert!("tab".parse::<ExportFormat>().is_err());
        assert_eq!(
            ExportFormat::Legend.path_for(Path::new("out/sectors")),
            PathBuf::from("out/sectors.legend.json")
        );
    }

    #[test]
    fn test_stacking_order_follows_legend() {
        let output = testutil::band_run();
        let ordered = stacking_order(&output.sectors, &output.report.legend);
        let rows: Vec<usize> = ordered.iter().map(|s| s.row).collect();
        // 1800 seen first (largest radius), then 900
        assert_eq!(rows, vec![0, 2, 1]);
    }

    #[test]
    fn test_export_all_formats() {
        let output = testutil::band_run();
        let bundle = ExportBundle::new(&output.sectors, &output.report);
        let dir = tempdir().unwrap();
        let base = dir.path().join("sectors");
        for format in [ExportFormat::GeoJson, ExportFormat::Kml, ExportFormat::Qml, ExportFormat::Legend] {
            let path = format.path_for(&base);
            export_to_path(format, &bundle, &path, None).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }
        let legend: Legend =
            serde_json::from_reader(File::open(ExportFormat::Legend.path_for(&base)).unwrap()).unwrap();
        assert_eq!(legend, output.report.legend);
    }

    #[test]
    fn test_capacity_refused() {
        let output = testutil::band_run();
        let bundle = ExportBundle::new(&output.sectors, &output.report);
        let dir = tempdir().unwrap();
        let path = dir.path().join("sectors.kml");
        let err = export_to_path(ExportFormat::Kml, &bundle, &path, Some(1)).unwrap_err();
        assert!(matches!(err, ExportError::Engine(SectorError::Capacity { .. })));
        assert!(!path.exists());
    }
}
