use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Raised at registration; the connector refuses to start.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(
        "publish/subscribe consumption is not safely shareable across multiple consumer threads \
         for a single subscription (threads = {threads})"
    )]
    PubSubThreads { threads: usize },

    #[error("durable_subscriber requires pub_sub to be enabled")]
    DurableWithoutPubSub,

    #[error("destination is required")]
    MissingDestination,

    #[error("threads must be at least 1")]
    ZeroThreads,

    #[error("invalid connector settings: {0}")]
    InvalidSettings(#[source] serde_json::Error),

    #[error("read settings file {path}")]
    ReadSettingsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse settings file {path}")]
    ParseSettingsFile {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("section {section:?} not found in {path}")]
    MissingSection { path: PathBuf, section: String },

    #[error("section {section:?} in {path} is not a key/value mapping")]
    InvalidSection { path: PathBuf, section: String },

    #[error("yaml_section is required when yaml_file is set")]
    MissingSectionName,

    #[error("directory lookup of {name:?} failed: {message}")]
    DirectoryLookup {
        name: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Failures reported by a broker backend.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker is momentarily unavailable; receiving may continue.
    #[error("transient broker error: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The session is no longer usable.
    #[error("fatal session error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl BrokerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn transient_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            source: None,
        }
    }

    pub fn fatal_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Fatal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "TransientBrokerError",
            Self::Fatal { .. } => "FatalSessionError",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("message body is not valid json")]
    InvalidJson(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    MessageConversion(#[from] ConversionError),

    #[error("consumer worker {worker} stopped after a fatal session error")]
    FatalSession { worker: usize },

    #[error("output queue is closed")]
    QueueClosed,
}

impl ConnectorError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Broker(error) => error.kind(),
            Self::MessageConversion(_) => "MessageConversionError",
            Self::FatalSession { .. } => "FatalSessionError",
            Self::QueueClosed => "QueueClosed",
        }
    }
}
