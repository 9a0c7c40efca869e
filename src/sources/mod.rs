pub mod directory;
pub mod inline;
pub mod yaml;

use crate::error::ConfigurationError;
use ingest_core::model::SettingsMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which source supplied the winning value of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Inline,
    File,
    Directory,
}

/// Loads one named section of an external settings file.
pub trait SettingsFile {
    fn load_section(&self, path: &Path, section: &str) -> Result<SettingsMap, ConfigurationError>;
}

impl<F> SettingsFile for F
where
    F: Fn(&Path, &str) -> Result<SettingsMap, ConfigurationError>,
{
    fn load_section(&self, path: &Path, section: &str) -> Result<SettingsMap, ConfigurationError> {
        self(path, section)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    pub factory: Option<String>,
    pub settings: SettingsMap,
}

/// Resolves a lookup name against a naming context.
pub trait DirectoryService {
    fn lookup(&self, name: &str, context: &SettingsMap)
    -> Result<DirectoryEntry, ConfigurationError>;
}

impl<F> DirectoryService for F
where
    F: Fn(&str, &SettingsMap) -> Result<DirectoryEntry, ConfigurationError>,
{
    fn lookup(
        &self,
        name: &str,
        context: &SettingsMap,
    ) -> Result<DirectoryEntry, ConfigurationError> {
        self(name, context)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub settings: SettingsMap,
    pub origins: BTreeMap<String, Origin>,
}

impl Resolution {
    /// Overwrites only the keys `layer` defines; everything else falls through.
    pub fn overlay(&mut self, origin: Origin, layer: SettingsMap) {
        for (key, value) in layer {
            self.origins.insert(key.clone(), origin);
            self.settings.insert(key, value);
        }
    }
}

/// Merges inline settings, then the file section, then the directory entry.
pub fn resolve(
    inline: &SettingsMap,
    files: &dyn SettingsFile,
    directory: &dyn DirectoryService,
) -> Result<Resolution, ConfigurationError> {
    let mut resolution = Resolution::default();
    resolution.overlay(Origin::Inline, normalize_keys(inline));

    if let Some((path, section)) = file_reference(&resolution.settings)? {
        let loaded = files.load_section(&path, &section)?;
        resolution.overlay(Origin::File, normalize_keys(&loaded));
    }

    if let Some(name) = non_empty_string(&resolution.settings, "jndi_name") {
        let context = resolution
            .settings
            .get("jndi_context")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<SettingsMap>()
            })
            .unwrap_or_default();

        let entry = directory.lookup(&name, &context)?;
        let mut layer = normalize_keys(&entry.settings);
        if let Some(factory) = entry.factory {
            layer.insert("factory".to_string(), Value::String(factory));
        }
        resolution.overlay(Origin::Directory, layer);
    }

    Ok(resolution)
}

/// `:broker_url` and `broker_url` name the same option.
pub fn normalize_key(key: &str) -> String {
    key.trim().trim_start_matches(':').to_string()
}

pub fn normalize_keys(settings: &SettingsMap) -> SettingsMap {
    settings
        .iter()
        .map(|(key, value)| (normalize_key(key), value.clone()))
        .collect()
}

fn file_reference(settings: &SettingsMap) -> Result<Option<(PathBuf, String)>, ConfigurationError> {
    let Some(path) = non_empty_string(settings, "yaml_file") else {
        return Ok(None);
    };
    let section =
        non_empty_string(settings, "yaml_section").ok_or(ConfigurationError::MissingSectionName)?;
    Ok(Some((PathBuf::from(path), section)))
}

fn non_empty_string(settings: &SettingsMap, key: &str) -> Option<String> {
    settings
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
