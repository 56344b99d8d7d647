//! Command-line options and the end-to-end run
//!
//! [`run`] collects every sector in memory before writing: the exporters
//! draw in legend stacking order, which needs the whole set. Embedders that
//! can write in row order should call [`SectorPipeline::run`] with their own
//! [`SectorSink`](sector_engine::SectorSink) to stay within one chunk of memory.

use crate::source::CsvSource;
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use sector_engine::record::{DEFAULT_MANUAL_BEAMWIDTH_DEG, DEFAULT_MANUAL_RADIUS_M};
use sector_engine::{
    ColumnMapping, EngineConfig, ManualFallback, Mode, PciModulo, RunReport, SectorPipeline,
};
use sector_export::{export_to_path, ExportBundle, ExportFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Color by frequency band, stacking radii per band
    Band,
    /// Color by PCI modulo group
    Pci,
}

#[derive(Parser, Debug)]
#[command(
    name = "site-sector",
    about = "Generate styled sector wedges from a cell-site CSV table"
)]
pub struct Args {
    /// Input CSV with a header row
    pub input: PathBuf,

    /// Styling mode
    #[arg(short, long, value_enum, default_value_t = ModeArg::Band)]
    pub mode: ModeArg,

    /// PCI modulus for --mode pci (3 or 6)
    #[arg(long, default_value_t = 3)]
    pub modulo: u32,

    /// Site id column
    #[arg(long, default_value = "Site")]
    pub id_col: String,

    /// Latitude column
    #[arg(long, default_value = "Latitude")]
    pub lat_col: String,

    /// Longitude column
    #[arg(long, default_value = "Longitude")]
    pub lon_col: String,

    /// Azimuth column, degrees clockwise from north
    #[arg(long, default_value = "Azimuth")]
    pub azimuth_col: String,

    /// Radius column in meters; omit to use --radius for every row
    #[arg(long)]
    pub radius_col: Option<String>,

    /// Beamwidth column in degrees; omit to use --beamwidth for every row
    #[arg(long)]
    pub beam_col: Option<String>,

    /// Band column (required for --mode band)
    #[arg(long)]
    pub band_col: Option<String>,

    /// PCI column (required for --mode pci)
    #[arg(long)]
    pub pci_col: Option<String>,

    /// Manual radius in meters
    #[arg(long, default_value_t = DEFAULT_MANUAL_RADIUS_M)]
    pub radius: f64,

    /// Manual beamwidth in degrees
    #[arg(long, default_value_t = DEFAULT_MANUAL_BEAMWIDTH_DEG)]
    pub beamwidth: f64,

    /// CSV field delimiter
    #[arg(long, default_value = ",")]
    pub delimiter: String,

    /// Engine config JSON (palettes, tessellation, worker pool)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads, overrides config (0 = all cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Arc steps per wedge, overrides config
    #[arg(long)]
    pub arc_segments: Option<usize>,

    /// Refuse exports estimated larger than this, overrides config
    #[arg(long)]
    pub max_output_bytes: Option<u64>,

    /// Output path stem; each format appends its own extension
    #[arg(short, long, default_value = "sectors")]
    pub output: PathBuf,

    /// Formats to write
    #[arg(short, long, value_delimiter = ',', default_value = "geojson,kml,qml,legend")]
    pub format: Vec<String>,

    /// Also write the run summary as JSON
    #[arg(long)]
    pub summary: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn mode(&self) -> Result<Mode> {
        match self.mode {
            ModeArg::Band => Ok(Mode::StyleByBand),
            ModeArg::Pci => Ok(Mode::AuditPci(PciModulo::try_from(self.modulo)?)),
        }
    }

    pub fn mapping(&self) -> ColumnMapping {
        let mut mapping =
            ColumnMapping::new(&self.id_col, &self.lat_col, &self.lon_col, &self.azimuth_col);
        if let Some(col) = &self.radius_col {
            mapping = mapping.with_radius(col);
        }
        if let Some(col) = &self.beam_col {
            mapping = mapping.with_beamwidth(col);
        }
        if let Some(col) = &self.band_col {
            mapping = mapping.with_band(col);
        }
        if let Some(col) = &self.pci_col {
            mapping = mapping.with_pci(col);
        }
        mapping
    }

    pub fn fallback(&self) -> ManualFallback {
        ManualFallback {
            radius_m: self.radius,
            beamwidth_deg: self.beamwidth,
        }
    }

    /// Config file (or defaults) with command-line overrides applied
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("loading config {:?}", path))?,
            None => EngineConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(segments) = self.arc_segments {
            config.arc_segments = segments;
        }
        if self.max_output_bytes.is_some() {
            config.max_output_bytes = self.max_output_bytes;
        }
        Ok(config)
    }

    pub fn formats(&self) -> Result<Vec<ExportFormat>> {
        let mut formats = Vec::new();
        for name in &self.format {
            let format: ExportFormat = name.parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            bail!("no output format selected");
        }
        Ok(formats)
    }

    fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [byte] => Ok(*byte),
            _ => bail!("delimiter must be a single ASCII character, got {:?}", self.delimiter),
        }
    }
}

/// Path the run summary is written to for output stem `base`
pub fn summary_path(base: &Path) -> PathBuf {
    base.with_extension("summary.json")
}

/// Read the input, run the engine and write every requested format
pub fn run(args: &Args) -> Result<RunReport> {
    let mode = args.mode()?;
    let config = args.engine_config()?;
    let formats = args.formats()?;
    let max_bytes = config.max_output_bytes;

    let source = CsvSource::open_with_delimiter(&args.input, args.delimiter_byte()?)
        .with_context(|| format!("opening {:?}", args.input))?;
    let pipeline = SectorPipeline::new(config, mode, args.mapping(), args.fallback())?;
    let output = pipeline.collect(&source)?;

    let summary = &output.report.summary;
    for skip in &summary.skips {
        warn!(
            "Skipped row {}{}: {}",
            skip.row,
            skip.id.as_deref().map(|id| format!(" ({})", id)).unwrap_or_default(),
            skip.reason
        );
    }

    let bundle = ExportBundle::new(&output.sectors, &output.report);
    for format in formats {
        let path = format.path_for(&args.output);
        export_to_path(format, &bundle, &path, max_bytes)
            .with_context(|| format!("writing {} to {:?}", format, path))?;
    }

    if args.summary {
        let path = summary_path(&args.output);
        info!("Writing run summary to {:?}", path);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, summary)?;
    }

    Ok(output.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SITES: &str = "\
Site,Latitude,Longitude,Azimuth,Band,PCI
JKT001,-6.2000,106.8000,0,LTE1800,101
JKT001,-6.2000,106.8000,120,LTE900,102
JKT001,-6.2000,106.8000,240,L2100,103
BDG002,-6.9000,bad,0,LTE1800,104
BDG003,-6.9100,107.6100,90,LTE1800,
";

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["site-sector", "sites.csv"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.mode().unwrap(), Mode::StyleByBand);
        assert_eq!(args.fallback(), ManualFallback::default());
        assert_eq!(
            args.formats().unwrap(),
            vec![ExportFormat::GeoJson, ExportFormat::Kml, ExportFormat::Qml, ExportFormat::Legend]
        );
        assert_eq!(args.engine_config().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_pci_mode_and_modulo() {
        let args = parse(&["--mode", "pci", "--modulo", "6"]);
        assert_eq!(args.mode().unwrap(), Mode::AuditPci(PciModulo::Pss));

        let args = parse(&["--mode", "pci", "--modulo", "4"]);
        assert!(args.mode().is_err());
    }

    #[test]
    fn test_overrides_and_formats() {
        let args = parse(&["--workers", "2", "--arc-segments", "8", "-f", "kml,KML,qml"]);
        let config = args.engine_config().unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.arc_segments, 8);
        assert_eq!(args.formats().unwrap(), vec![ExportFormat::Kml, ExportFormat::Qml]);

        let args = parse(&["-f", "tab"]);
        assert!(args.formats().is_err());
    }

    #[test]
    fn test_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{"arc_segments": 24, "chunk_size": 2}"#).unwrap();
        let config_arg = path.to_string_lossy().to_string();
        let args = parse(&["--config", &config_arg, "--arc-segments", "12"]);
        let config = args.engine_config().unwrap();
        assert_eq!(config.chunk_size, 2);
        assert_eq!(config.arc_segments, 12);
    }

    #[test]
    fn test_band_run_end_to_end() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sites.csv");
        fs::write(&input, SITES).unwrap();
        let base = dir.path().join("out");

        let args = Args::try_parse_from([
            "site-sector",
            input.to_str().unwrap(),
            "--band-col",
            "Band",
            "--workers",
            "1",
            "--output",
            base.to_str().unwrap(),
            "--summary",
        ])
        .unwrap();
        let report = run(&args).unwrap();

        // BDG002 has a bad longitude; a missing PCI does not matter in band mode
        assert_eq!(report.summary.processed_count, 4);
        assert_eq!(report.summary.skipped_count, 1);
        assert_eq!(report.summary.skips[0].row, 3);
        assert_eq!(report.legend.len(), 3);

        for format in [ExportFormat::GeoJson, ExportFormat::Kml, ExportFormat::Qml, ExportFormat::Legend] {
            assert!(format.path_for(&base).exists(), "{} missing", format);
        }
        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary_path(&base)).unwrap()).unwrap();
        assert_eq!(summary["processed_count"], 4);
    }

    #[test]
    fn test_pci_run_skips_missing_pci() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sites.csv");
        fs::write(&input, SITES).unwrap();
        let base = dir.path().join("audit");

        let args = Args::try_parse_from([
            "site-sector",
            input.to_str().unwrap(),
            "--mode",
            "pci",
            "--pci-col",
            "PCI",
            "--output",
            base.to_str().unwrap(),
            "-f",
            "kml",
        ])
        .unwrap();
        let report = run(&args).unwrap();

        assert_eq!(report.summary.processed_count, 3);
        assert_eq!(report.summary.skipped_count, 2);
        assert_eq!(report.legend.attribute, "Mod_3");
        assert!(ExportFormat::Kml.path_for(&base).exists());
        assert!(!ExportFormat::GeoJson.path_for(&base).exists());
    }

    #[test]
    fn test_csv_streams_through_sink() {
        use sector_engine::{SectorSink, StyledSector};

        #[derive(Default)]
        struct Counter {
            batches: Vec<usize>,
        }
        impl SectorSink for Counter {
            fn accept(&mut self, batch: Vec<StyledSector>) -> sector_engine::Result<()> {
                self.batches.push(batch.len());
                Ok(())
            }
        }

        let dir = tempdir().unwrap();
        let input = dir.path().join("sites.csv");
        fs::write(&input, SITES).unwrap();
        let args = Args::try_parse_from(["site-sector", input.to_str().unwrap(), "--band-col", "Band"]).unwrap();
        let config = EngineConfig {
            worker_count: 1,
            chunk_size: 2,
            ..Default::default()
        };
        let source = CsvSource::open(&args.input).unwrap();
        let pipeline =
            SectorPipeline::new(config, args.mode().unwrap(), args.mapping(), args.fallback()).unwrap();
        let mut sink = Counter::default();
        let report = pipeline.run(&source, &mut sink).unwrap();

        // 5 rows in chunks of 2; the bad-longitude row drops out of the second
        assert_eq!(sink.batches, vec![2, 1, 1]);
        assert_eq!(report.summary.processed_count, 4);
    }

    #[test]
    fn test_missing_band_column_is_fatal() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sites.csv");
        fs::write(&input, SITES).unwrap();
        let args = Args::try_parse_from([
            "site-sector",
            input.to_str().unwrap(),
            "--band-col",
            "Frequency",
        ])
        .unwrap();
        assert!(run(&args).is_err());
    }
}
