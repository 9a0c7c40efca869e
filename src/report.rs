//! Structured, loop-safe descriptions of failures and their cause chains.

use crate::error::{BrokerError, ConfigurationError, ConnectorError, ConversionError};
use ingest_core::model::ErrorDescription;
use std::borrow::Cow;
use std::collections::HashSet;
use std::error::Error as StdError;

/// Describes `failure` and the deepest cause reachable without revisiting a node.
///
/// Cause identity is the error value's address together with its vtable, so
/// a chain that loops back onto an earlier node stops there and flags
/// `exception_loop`, while a source stored inline in its parent stays distinct.
pub fn error_hash(failure: &(dyn StdError + 'static)) -> ErrorDescription {
    let mut description = ErrorDescription::new(kind_name(failure), failure.to_string());

    let mut visited = HashSet::new();
    visited.insert(identity(failure));

    let mut current = failure;
    let mut root_cause = None;
    while let Some(cause) = current.source() {
        let mut node = ErrorDescription::new(kind_name(cause), cause.to_string());
        if !visited.insert(identity(cause)) {
            node.exception_loop = true;
            root_cause = Some(node);
            break;
        }
        root_cause = Some(node);
        current = cause;
    }

    description.root_cause = root_cause.map(Box::new);
    description
}

fn identity(error: &(dyn StdError + 'static)) -> *const (dyn StdError + 'static) {
    error as *const (dyn StdError + 'static)
}

pub fn kind_name(error: &(dyn StdError + 'static)) -> Cow<'static, str> {
    #[cfg(test)]
    if let Some(native) = error.downcast_ref::<native::NativeFailure>() {
        return Cow::Owned(native.kind().to_string());
    }
    if let Some(connector) = error.downcast_ref::<ConnectorError>() {
        return Cow::Borrowed(connector.kind());
    }
    if let Some(broker) = error.downcast_ref::<BrokerError>() {
        return Cow::Borrowed(broker.kind());
    }
    if error.is::<ConfigurationError>() {
        return Cow::Borrowed("ConfigurationError");
    }
    if error.is::<ConversionError>() {
        return Cow::Borrowed("MessageConversionError");
    }
    if error.is::<std::io::Error>() {
        return Cow::Borrowed("std::io::Error");
    }
    if error.is::<serde_json::Error>() {
        return Cow::Borrowed("serde_json::Error");
    }
    if error.is::<serde_yaml::Error>() {
        return Cow::Borrowed("serde_yaml::Error");
    }
    if error.is::<rdkafka::error::KafkaError>() {
        return Cow::Borrowed("rdkafka::error::KafkaError");
    }
    Cow::Borrowed("Error")
}
