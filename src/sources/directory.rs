use crate::error::ConfigurationError;
use crate::sources::{DirectoryEntry, DirectoryService};
use ingest_core::model::SettingsMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROVIDER_URL_KEY: &str = "java.naming.provider.url";
const FILE_SCHEME: &str = "file://";

/// Naming context backed by a YAML bindings document.
///
/// The context's provider url must be a `file://` url. The document maps each
/// lookup name to a flat entry; an entry's `factory` key is the connection
/// factory handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDirectory;

impl DirectoryService for FileDirectory {
    fn lookup(
        &self,
        name: &str,
        context: &SettingsMap,
    ) -> Result<DirectoryEntry, ConfigurationError> {
        let path = provider_path(name, context)?;
        let raw = fs::read_to_string(&path).map_err(|source| ConfigurationError::DirectoryLookup {
            name: name.to_string(),
            message: format!("read bindings {}", path.display()),
            source: Some(Box::new(source)),
        })?;
        parse_bindings(name, &path, &raw)
    }
}

fn provider_path(name: &str, context: &SettingsMap) -> Result<PathBuf, ConfigurationError> {
    let url = context
        .get(PROVIDER_URL_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ConfigurationError::DirectoryLookup {
            name: name.to_string(),
            message: format!("jndi_context is missing {PROVIDER_URL_KEY}"),
            source: None,
        })?;

    url.strip_prefix(FILE_SCHEME)
        .map(PathBuf::from)
        .ok_or_else(|| ConfigurationError::DirectoryLookup {
            name: name.to_string(),
            message: format!("unsupported provider url {url}; only file:// contexts are supported"),
            source: None,
        })
}

fn parse_bindings(name: &str, path: &Path, raw: &str) -> Result<DirectoryEntry, ConfigurationError> {
    let lookup_error = |message: String| ConfigurationError::DirectoryLookup {
        name: name.to_string(),
        message,
        source: None,
    };

    let bindings: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(raw).map_err(|source| ConfigurationError::DirectoryLookup {
            name: name.to_string(),
            message: format!("parse bindings {}", path.display()),
            source: Some(Box::new(source)),
        })?;

    let entry = bindings
        .get(name)
        .ok_or_else(|| lookup_error(format!("name not bound in {}", path.display())))?;

    let mut settings = serde_json::to_value(entry)
        .ok()
        .and_then(|value| serde_json::from_value::<SettingsMap>(value).ok())
        .ok_or_else(|| lookup_error("bound entry is not a key/value mapping".to_string()))?;

    let factory = match settings.remove("factory") {
        Some(Value::String(factory)) => Some(factory),
        Some(_) => return Err(lookup_error("bound factory must be a string".to_string())),
        None => None,
    };

    Ok(DirectoryEntry { factory, settings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const BINDINGS: &str = r#"
/jms/cf/default:
  factory: kafka
  broker_url: kafka://localhost:9092
  username: directory-user
/jms/cf/broken: 17
"#;

    fn context_for(path: &Path) -> SettingsMap {
        serde_json::from_value(json!({
            PROVIDER_URL_KEY: format!("file://{}", path.display()),
            "java.naming.security.principal": "username"
        }))
        .expect("context map")
    }

    #[test]
    fn resolves_bound_name_from_file_context() {
        let mut file = tempfile::NamedTempFile::new().expect("create bindings");
        file.write_all(BINDINGS.as_bytes()).expect("write bindings");

        let entry = FileDirectory
            .lookup("/jms/cf/default", &context_for(file.path()))
            .expect("lookup");

        assert_eq!(entry.factory.as_deref(), Some("kafka"));
        assert_eq!(entry.settings["broker_url"], "kafka://localhost:9092");
        assert_eq!(entry.settings["username"], "directory-user");
        assert!(!entry.settings.contains_key("factory"));
        assert!(!entry.settings.contains_key("password"));
    }

    #[test]
    fn unbound_name_fails() {
        let error = parse_bindings("/jms/cf/other", Path::new("bindings.yml"), BINDINGS)
            .expect_err("name is not bound");
        assert!(matches!(error, ConfigurationError::DirectoryLookup { .. }));
    }

    #[test]
    fn non_mapping_entry_fails() {
        let error = parse_bindings("/jms/cf/broken", Path::new("bindings.yml"), BINDINGS)
            .expect_err("entry is a scalar");
        assert!(matches!(error, ConfigurationError::DirectoryLookup { .. }));
    }

    #[test]
    fn network_provider_urls_are_rejected() {
        let context: SettingsMap = serde_json::from_value(json!({
            PROVIDER_URL_KEY: "tcp://localhost:20608"
        }))
        .expect("context map");

        let error = FileDirectory
            .lookup("/jms/cf/default", &context)
            .expect_err("tcp provider is unsupported");
        assert!(error.to_string().contains("/jms/cf/default"));
    }

    #[test]
    fn missing_provider_url_fails() {
        let error = FileDirectory
            .lookup("/jms/cf/default", &SettingsMap::new())
            .expect_err("provider url required");
        assert!(matches!(error, ConfigurationError::DirectoryLookup { .. }));
    }
}
