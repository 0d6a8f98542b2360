//! Ingestion and cleaning of Backblaze hard-drive SMART telemetry for
//! prognostic health management.
//!
//! The usual flow is [`config::DataConfig`] → [`data::load_file`] →
//! [`data::clean`] → [`data::preview`], see [`load_and_clean`].

pub mod config;
pub mod data;
pub mod error;
pub mod logging;

use std::path::Path;

use log::info;

pub use error::{IngestError, Result};

/// Read the file at `path` and clean it with `rules`.
///
/// A missing file fails before any cleaning logic runs.
pub fn load_and_clean(path: &Path, rules: &data::CleaningRules) -> Result<data::Dataset> {
    let raw = data::load_file(path)?;
    info!("Cleaning {} raw rows", raw.len());
    let cleaned = data::clean(&raw, rules)?;
    info!(
        "Cleaned dataset: {} rows, {} columns",
        cleaned.len(),
        cleaned.width()
    );
    Ok(cleaned)
}
