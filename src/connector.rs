use crate::broker::{Broker, ConsumerMode};
use crate::config::ResolvedConfig;
use crate::error::{ConfigurationError, ConnectorError};
use crate::queue::EventQueue;
use crate::session::SessionManager;
use crate::shutdown::StopSignal;
use crate::sources::{DirectoryService, Origin, SettingsFile, resolve};
use crate::validate::{ValidatedConfig, validate};
use crate::worker::RunSummary;
use ingest_core::model::SettingsMap;
use ingest_core::redact::redact_settings;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A registered connector: resolved, validated and ready to run.
#[derive(Debug, Clone)]
pub struct Connector {
    settings: ValidatedConfig,
    log_context: SettingsMap,
    origins: BTreeMap<String, Origin>,
}

impl Connector {
    /// Resolves every configuration source and validates the result.
    ///
    /// Nothing here touches the broker; a returned error means the connector
    /// must not start.
    pub fn register(
        inline: &SettingsMap,
        files: &dyn SettingsFile,
        directory: &dyn DirectoryService,
    ) -> Result<Self, ConfigurationError> {
        let resolution = resolve(inline, files, directory)?;
        let log_context = redact_settings(&resolution.settings);
        debug!(
            context = %serde_json::Value::Object(log_context.clone().into_iter().collect()),
            "resolved broker configuration"
        );

        let config = ResolvedConfig::from_settings(&resolution.settings)?;
        let settings = validate(config)?;

        info!(
            destination = %settings.config.destination,
            mode = settings.mode.as_str(),
            threads = settings.config.threads,
            "registered broker connector"
        );

        Ok(Self {
            settings,
            log_context,
            origins: resolution.origins,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.settings.config
    }

    pub fn mode(&self) -> &ConsumerMode {
        &self.settings.mode
    }

    /// The merged settings with credentials replaced; safe to log.
    pub fn log_context(&self) -> &SettingsMap {
        &self.log_context
    }

    pub fn origins(&self) -> &BTreeMap<String, Origin> {
        &self.origins
    }

    /// Blocks until the stop signal fires or the session fails fatally.
    pub fn run<B: Broker, Q: EventQueue>(
        &self,
        broker: &B,
        queue: &Q,
        stop: &StopSignal,
    ) -> Result<RunSummary, ConnectorError> {
        SessionManager::new(broker, &self.settings).run(queue, stop)
    }
}
