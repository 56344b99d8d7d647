//! CSV record source

use csv::{ReaderBuilder, StringRecord, Trim};
use sector_engine::pipeline::RowResult;
use sector_engine::{RawRow, RecordSource, Result, SectorError, SkipReason, SkipRecord};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const UTF8_BOM: char = '\u{feff}';

/// A CSV file with a header row.
///
/// Headers are read once at open. Each [`RecordSource::rows`] call reopens
/// the file, so the band pre-pass and the main pass see the same rows.
/// Short rows are allowed; a row the reader rejects becomes a `Malformed` skip.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    headers: Vec<String>,
}

impl CsvSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_delimiter(path, b',')
    }

    pub fn open_with_delimiter(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening CSV source {:?}", path);

        let mut reader = reader(&path, delimiter)?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(source_error)?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();
        debug!("Headers: {:?}", headers);

        Ok(Self {
            path,
            delimiter,
            headers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file))
}

fn source_error(err: csv::Error) -> SectorError {
    SectorError::Source(err.to_string())
}

fn to_row(row: usize, record: csv::Result<StringRecord>) -> RowResult {
    match record {
        Ok(record) => Ok(RawRow::new(row, record.iter().map(str::to_string).collect())),
        Err(err) => Err(SkipRecord {
            row,
            id: None,
            reason: SkipReason::Malformed(err.to_string()),
        }),
    }
}

impl RecordSource for CsvSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn rows(&self) -> Result<Box<dyn Iterator<Item = RowResult> + '_>> {
        let reader = reader(&self.path, self.delimiter)?;
        Ok(Box::new(
            reader
                .into_records()
                .enumerate()
                .map(|(i, record)| to_row(i, record)),
        ))
    }
}
