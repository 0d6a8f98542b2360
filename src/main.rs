use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use phm_ml::config::{DataConfig, DataRole, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use phm_ml::data::preview;
use phm_ml::{load_and_clean, logging};

fn main() -> Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = DataConfig::from_yaml(&config_path)
        .with_context(|| format!("loading configuration {}", config_path.display()))?;
    logging::init(config.log_file.as_deref()).context("opening log file")?;

    let rules = config.cleaning_rules().context("selecting cleaning rules")?;
    let train_path = config.resolve(DataRole::Train)?;
    info!(
        "Cleaning {} as {}",
        train_path.display(),
        config.dataset.kind
    );

    let cleaned = load_and_clean(&train_path, &rules)
        .with_context(|| format!("ingesting {}", train_path.display()))?;

    println!("{}", preview(&cleaned, config.preview_rows)?);
    Ok(())
}
