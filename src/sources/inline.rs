use crate::error::ConfigurationError;
use ingest_core::model::SettingsMap;
use std::fs;
use std::path::Path;

/// Inline connector parameters written as a TOML table.
pub fn load_inline_file(path: &Path) -> Result<SettingsMap, ConfigurationError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::ReadSettingsFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_inline(path, &raw)
}

pub fn parse_inline(path: &Path, raw: &str) -> Result<SettingsMap, ConfigurationError> {
    toml::from_str::<SettingsMap>(raw).map_err(|source| ConfigurationError::ParseSettingsFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}
