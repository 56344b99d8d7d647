//! Sector pipeline orchestration
//!
//! ```text
//! Init → Validate → BuildRadiusPlan (band mode) → GenerateGeometry → AssignStyle → Emit
//! ```
//!
//! Rows stream from a [`RecordSource`] in chunks of `chunk_size`. Each chunk
//! is transformed on a rayon pool and handed to a [`SectorSink`] in row
//! order before the next chunk is read, so memory stays bounded by the chunk
//! size. In band mode the source is read twice: a single-threaded pre-pass
//! collects distinct band keys in first-seen order, which fixes the radius
//! plan and every band color before any worker starts.
//!
//! Bad rows never abort the run. They are recorded as [`SkipRecord`]s with
//! their row index and the run carries on. Only configuration and structural
//! problems (a mapped column missing from the source) stop it.

use crate::band::BandNormalizer;
use crate::config::EngineConfig;
use crate::geometry::{build_wedge, LatLon};
use crate::pci::classify_with;
use crate::radius::RadiusPlan;
use crate::record::{
    ColumnMapping, ManualFallback, RadiusSource, RawRow, ResolvedColumns, SkipReason, SkipRecord,
};
use crate::style::{Legend, ThematicStyler};
use crate::{BandKey, ColorKey, PciModulo, Result, SectorError, StyledSector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Approximate serialized bytes per ring vertex (`lon,lat,0 ` as text)
pub const BYTES_PER_VERTEX: u64 = 40;

/// Approximate fixed bytes per exported feature (tags, style, attributes)
pub const BYTES_PER_FEATURE: u64 = 512;

/// Thematic mode for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    StyleByBand,
    AuditPci(PciModulo),
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::StyleByBand => write!(f, "band"),
            Mode::AuditPci(m) => write!(f, "pci {}", m),
        }
    }
}

/// Pipeline state, advanced in order.
///
/// GenerateGeometry and AssignStyle alternate once per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunPhase {
    Init,
    Validate,
    BuildRadiusPlan,
    GenerateGeometry,
    AssignStyle,
    Emit,
    Done,
}

pub type RowResult = std::result::Result<RawRow, SkipRecord>;

/// A re-readable table of rows.
///
/// `rows` may be called more than once; each call restarts from the first
/// data row. Rows that cannot even be read come back as `Err(SkipRecord)`.
pub trait RecordSource {
    fn headers(&self) -> &[String];
    fn rows(&self) -> Result<Box<dyn Iterator<Item = RowResult> + '_>>;
}

/// Receives sectors chunk by chunk, in row order
pub trait SectorSink {
    fn accept(&mut self, batch: Vec<StyledSector>) -> Result<()>;
}

impl SectorSink for Vec<StyledSector> {
    fn accept(&mut self, batch: Vec<StyledSector>) -> Result<()> {
        self.extend(batch);
        Ok(())
    }
}

/// In-memory rows, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MemorySource {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_strs(headers: &[&str], rows: &[Vec<&str>]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RecordSource for MemorySource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn rows(&self) -> Result<Box<dyn Iterator<Item = RowResult> + '_>> {
        Ok(Box::new(
            self.rows
                .iter()
                .enumerate()
                .map(|(i, values)| Ok(RawRow::new(i, values.clone()))),
        ))
    }
}

/// Cooperative cancellation flag, checked between chunks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts and skip reasons for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub processed_count: usize,
    pub skipped_count: usize,
    /// Skips in source row order
    pub skips: Vec<SkipRecord>,
    pub estimated_output_bytes: u64,
    pub generated_at: String,
}

impl RunSummary {
    /// Fail with [`SectorError::Capacity`] when the estimated export exceeds `limit`
    pub fn check_capacity(&self, limit: Option<u64>) -> Result<()> {
        match limit {
            Some(limit) if self.estimated_output_bytes > limit => Err(SectorError::Capacity {
                estimated: self.estimated_output_bytes,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

/// What a run hands to exporters besides the sectors themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub headers: Vec<String>,
    pub legend: Legend,
    pub summary: RunSummary,
}

/// Sectors collected in memory plus the run report
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub sectors: Vec<StyledSector>,
    pub report: RunReport,
}

/// Estimated export size for `records` sectors at the given tessellation.
///
/// Depends only on the record count, so callers can check it against a
/// budget before any geometry is generated. Attribute text is covered by
/// [`BYTES_PER_FEATURE`].
pub fn estimate_output_bytes(records: usize, arc_segments: usize) -> u64 {
    // apex + arc points + closing apex
    let vertices = (arc_segments as u64).saturating_add(3);
    let per_feature = vertices
        .saturating_mul(BYTES_PER_VERTEX)
        .saturating_add(BYTES_PER_FEATURE);
    (records as u64).saturating_mul(per_feature)
}

/// Read-only state shared by workers during GenerateGeometry / AssignStyle
struct RunContext<'a> {
    columns: ResolvedColumns,
    plan: RadiusPlan,
    normalizer: &'a BandNormalizer,
    styler: ThematicStyler,
}

pub struct SectorPipeline {
    config: EngineConfig,
    mode: Mode,
    mapping: ColumnMapping,
    fallback: ManualFallback,
    cancel: CancellationToken,
    normalizer: BandNormalizer,
    phase: Mutex<RunPhase>,
}

impl SectorPipeline {
    /// Init: validate configuration. Any error here is fatal for the run.
    pub fn new(
        config: EngineConfig,
        mode: Mode,
        mapping: ColumnMapping,
        fallback: ManualFallback,
    ) -> Result<Self> {
        config.validate()?;
        if !(fallback.radius_m.is_finite() && fallback.radius_m > 0.0) {
            return Err(SectorError::Configuration(format!(
                "manual radius must be positive, got {}",
                fallback.radius_m
            )));
        }
        if !(fallback.beamwidth_deg.is_finite() && fallback.beamwidth_deg > 0.0) {
            return Err(SectorError::Configuration(format!(
                "manual beamwidth must be positive, got {}",
                fallback.beamwidth_deg
            )));
        }
        Ok(Self {
            config,
            mode,
            mapping,
            fallback,
            cancel: CancellationToken::new(),
            normalizer: BandNormalizer::new(),
            phase: Mutex::new(RunPhase::Init),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Last phase entered. A failed run stays in the phase it failed in.
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, phase: RunPhase) {
        debug!("Phase: {:?}", phase);
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run into an in-memory vector
    pub fn collect<S: RecordSource>(&self, source: &S) -> Result<RunOutput> {
        let mut sectors = Vec::new();
        let report = self.run(source, &mut sectors)?;
        Ok(RunOutput { sectors, report })
    }

    /// Run the full pipeline, streaming sectors into `sink`
    pub fn run<S: RecordSource, K: SectorSink>(&self, source: &S, sink: &mut K) -> Result<RunReport> {
        let workers = self.config.resolved_workers();
        info!(
            "Sector run: mode={} workers={} chunk_size={} arc_segments={}",
            self.mode, workers, self.config.chunk_size, self.config.arc_segments
        );

        self.enter(RunPhase::Validate);
        let headers = source.headers().to_vec();
        let columns = self.mapping.resolve(&headers, self.mode)?;

        let (plan, styler) = match self.mode {
            Mode::StyleByBand => {
                self.enter(RunPhase::BuildRadiusPlan);
                let keys = self.distinct_band_keys(source, &columns)?;
                let plan = RadiusPlan::build(
                    &keys,
                    self.config.base_decrement_fraction,
                    self.config.min_radius_fraction,
                )?;
                info!("Radius plan built for {} bands", plan.len());
                for (key, factor) in plan.iter() {
                    debug!("  band {:>8} → x{:.2}", key.as_str(), factor);
                }
                let styler =
                    ThematicStyler::for_bands(self.config.band_palette.clone(), self.config.band_opacity)?;
                if let ThematicStyler::Band(registry) = &styler {
                    registry.seed(&keys);
                }
                (plan, styler)
            }
            Mode::AuditPci(modulo) => {
                let styler =
                    ThematicStyler::for_pci(modulo, &self.config.pci_palette, self.config.pci_opacity)?;
                (RadiusPlan::empty(), styler)
            }
        };

        let ctx = RunContext {
            columns,
            plan,
            normalizer: &self.normalizer,
            styler,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SectorError::Configuration(format!("worker pool: {}", e)))?;

        let mut rows = source.rows()?;
        let mut processed = 0usize;
        let mut skips: Vec<SkipRecord> = Vec::new();
        let mut chunk_index = 0usize;

        loop {
            let chunk: Vec<RowResult> = rows.by_ref().take(self.config.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                warn!("Run cancelled after {} records", processed);
                return Err(SectorError::Cancelled { processed });
            }

            self.enter(RunPhase::GenerateGeometry);
            let generated: Vec<std::result::Result<Generated, SkipRecord>> = pool.install(|| {
                chunk
                    .into_par_iter()
                    .map(|row| row.and_then(|raw| self.generate(&ctx, raw)))
                    .collect()
            });

            self.enter(RunPhase::AssignStyle);
            let mut batch = Vec::with_capacity(generated.len());
            for result in generated {
                match result {
                    Ok(sector) => batch.push(sector.styled(&ctx.styler)),
                    Err(skip) => {
                        debug!("Skipping row {}: {}", skip.row, skip.reason);
                        skips.push(skip);
                    }
                }
            }

            processed += batch.len();
            debug!(
                "Chunk {}: {} sectors, {} skipped so far",
                chunk_index,
                batch.len(),
                skips.len()
            );
            sink.accept(batch)?;
            chunk_index += 1;
        }

        self.enter(RunPhase::Emit);
        let legend = ctx.styler.legend();
        let summary = RunSummary {
            mode: self.mode,
            processed_count: processed,
            skipped_count: skips.len(),
            skips,
            estimated_output_bytes: estimate_output_bytes(processed, self.config.arc_segments),
            generated_at: chrono::Utc::now().to_rfc3339(),
        };

        info!(
            "Generated {} sectors ({} skipped), {} legend entries",
            summary.processed_count,
            summary.skipped_count,
            legend.len()
        );
        self.enter(RunPhase::Done);

        Ok(RunReport {
            headers,
            legend,
            summary,
        })
    }

    /// Single-threaded pre-pass: distinct band keys in first-seen order
    fn distinct_band_keys<S: RecordSource>(
        &self,
        source: &S,
        columns: &ResolvedColumns,
    ) -> Result<Vec<BandKey>> {
        let Some(band_col) = columns.band else {
            return Err(SectorError::UnmappedColumn("band"));
        };
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for raw in source.rows()?.flatten() {
            let Some(label) = raw.values.get(band_col).map(|v| v.trim()) else {
                continue;
            };
            if label.is_empty() {
                continue;
            }
            let key = self.normalizer.normalize(label);
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// GenerateGeometry for one row: validated record, thematic key and wedge
    fn generate(&self, ctx: &RunContext<'_>, raw: RawRow) -> std::result::Result<Generated, SkipRecord> {
        let record = ctx.columns.extract(&raw, &self.fallback, self.mode)?;
        let skip = |reason: SkipReason| SkipRecord {
            row: record.row,
            id: Some(record.id.clone()),
            reason,
        };

        let (color_key, radius_m) = match self.mode {
            Mode::StyleByBand => {
                let label = record.band_raw.as_deref().unwrap_or_default();
                let key = ctx.normalizer.normalize(label);
                let radius = match record.radius_source {
                    RadiusSource::Manual => ctx.plan.scaled_radius(&key, record.radius_m),
                    RadiusSource::Column => record.radius_m,
                };
                (ColorKey::Band(key), radius)
            }
            Mode::AuditPci(modulo) => {
                let pci = record
                    .pci
                    .ok_or_else(|| skip(SkipReason::MissingField("pci".to_string())))?;
                let group = classify_with(pci, modulo).map_err(|e| skip(e.into()))?;
                (ColorKey::PciGroup(group), record.radius_m)
            }
        };

        let wedge = build_wedge(
            record.lat,
            record.lon,
            record.azimuth_deg,
            radius_m,
            record.beamwidth_deg,
            self.config.arc_segments,
        )
        .map_err(|e| skip(e.into()))?;

        Ok(Generated {
            row: record.row,
            id: record.id,
            apex: wedge.apex,
            ring: wedge.ring,
            color_key,
            azimuth_deg: record.azimuth_deg,
            radius_m,
            beamwidth_deg: record.beamwidth_deg,
            attributes: raw.values,
        })
    }
}

/// A sector between GenerateGeometry and AssignStyle
struct Generated {
    row: usize,
    id: String,
    apex: LatLon,
    ring: Vec<LatLon>,
    color_key: ColorKey,
    azimuth_deg: f64,
    radius_m: f64,
    beamwidth_deg: f64,
    attributes: Vec<String>,
}

impl Generated {
    fn styled(self, styler: &ThematicStyler) -> StyledSector {
        let fill = styler.color_for(&self.color_key);
        StyledSector {
            row: self.row,
            id: self.id,
            apex: self.apex,
            ring: self.ring,
            color_key: self.color_key,
            fill,
            azimuth_deg: self.azimuth_deg,
            radius_m: self.radius_m,
            beamwidth_deg: self.beamwidth_deg,
            attributes: self.attributes,
        }
    }
}
