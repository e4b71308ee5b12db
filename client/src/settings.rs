use std::path::PathBuf;

use anyhow::Result;
use common::{Config, ConfigLoader};

/// Application settings resolved from the HOCON config file, with env-var
/// overrides courtesy of the loader.
#[derive(Debug)]
pub struct Settings {
    pub db_path: PathBuf,
    pub book_path: Option<PathBuf>,
    pub engine_enabled: bool,
    pub engine_binary: Option<PathBuf>,
    pub engine_model: Option<PathBuf>,
    pub engine_config: Option<PathBuf>,
    pub engine_label: String,
    pub engine_timeout_secs: u64,
    pub top_moves_count: usize,
    pub visits_19x19: u32,
    pub visits_small: u32,
}

impl Config for Settings {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let optional_path = |name: &str| -> Result<Option<PathBuf>> {
            if config.get(name).is_some() {
                Ok(Some(config.get_relative_path(name)?))
            } else {
                Ok(None)
            }
        };

        let db_path = optional_path("db_path")?
            .unwrap_or_else(|| PathBuf::from("data/analysis.db"));

        Ok(Self {
            db_path,
            book_path: optional_path("book_path")?,
            engine_enabled: config
                .get("engine_enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            engine_binary: optional_path("engine_binary")?,
            engine_model: optional_path("engine_model")?,
            engine_config: optional_path("engine_config")?,
            engine_label: config
                .get("engine_label")
                .and_then(|v| v.as_string())
                .unwrap_or_else(|| "katago".to_string()),
            engine_timeout_secs: config
                .get("engine_timeout_secs")
                .and_then(|v| v.as_usize())
                .unwrap_or(60) as u64,
            top_moves_count: config
                .get("top_moves_count")
                .and_then(|v| v.as_usize())
                .unwrap_or(10),
            visits_19x19: config
                .get("visits_19x19")
                .and_then(|v| v.as_usize())
                .unwrap_or(150) as u32,
            visits_small: config
                .get("visits_small")
                .and_then(|v| v.as_usize())
                .unwrap_or(500) as u32,
        })
    }
}
