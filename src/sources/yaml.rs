use crate::error::ConfigurationError;
use crate::sources::SettingsFile;
use ingest_core::model::SettingsMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Reads `yaml_file` and returns the mapping stored under `yaml_section`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSettingsFile;

impl SettingsFile for YamlSettingsFile {
    fn load_section(&self, path: &Path, section: &str) -> Result<SettingsMap, ConfigurationError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::ReadSettingsFile {
            path: path.to_path_buf(),
            source,
        })?;
        parse_section(path, &raw, section)
    }
}

pub fn parse_section(
    path: &Path,
    raw: &str,
    section: &str,
) -> Result<SettingsMap, ConfigurationError> {
    let document: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(raw).map_err(|source| ConfigurationError::ParseSettingsFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;

    let value = document
        .get(section)
        .ok_or_else(|| ConfigurationError::MissingSection {
            path: path.to_path_buf(),
            section: section.to_string(),
        })?;

    if !value.is_mapping() {
        return Err(ConfigurationError::InvalidSection {
            path: path.to_path_buf(),
            section: section.to_string(),
        });
    }

    serde_json::to_value(value)
        .and_then(serde_json::from_value::<SettingsMap>)
        .map_err(|source| ConfigurationError::ParseSettingsFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
}
