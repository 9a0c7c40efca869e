use crate::broker::{ConsumerMode, DurableSubscription};
use crate::config::{DEFAULT_CLIENT_ID, ResolvedConfig};
use crate::error::ConfigurationError;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub config: ResolvedConfig,
    pub mode: ConsumerMode,
}

/// Rejects mutually exclusive options and fills durable-subscription defaults.
pub fn validate(mut config: ResolvedConfig) -> Result<ValidatedConfig, ConfigurationError> {
    if config.destination.trim().is_empty() {
        return Err(ConfigurationError::MissingDestination);
    }

    if config.threads == 0 {
        return Err(ConfigurationError::ZeroThreads);
    }

    if config.pub_sub && config.threads > 1 {
        return Err(ConfigurationError::PubSubThreads {
            threads: config.threads,
        });
    }

    if config.durable_subscriber && !config.pub_sub {
        return Err(ConfigurationError::DurableWithoutPubSub);
    }

    let mode = if !config.pub_sub {
        ConsumerMode::PointToPoint
    } else if config.durable_subscriber {
        let client_id = non_blank(config.durable_subscriber_client_id.take())
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let name = non_blank(config.durable_subscriber_name.take())
            .unwrap_or_else(|| config.destination.clone());

        config.durable_subscriber_client_id = Some(client_id.clone());
        config.durable_subscriber_name = Some(name.clone());

        ConsumerMode::PubSub {
            durable: Some(DurableSubscription { name, client_id }),
        }
    } else {
        ConsumerMode::PubSub { durable: None }
    };

    Ok(ValidatedConfig { config, mode })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
