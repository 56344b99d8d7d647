//! Site Sector CLI
//!
//! CSV ingestion and the `site-sector` command: read a cell-site table,
//! run the sector engine, write GeoJSON / KML / QML / legend outputs.

pub mod app;
pub mod source;

pub use app::{run, Args};
pub use source::CsvSource;
