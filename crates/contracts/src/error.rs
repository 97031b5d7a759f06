//! Errors crossing crate boundaries

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    /// The config file is not valid TOML/JSON for a `DaemonBlueprint`
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A parsed config breaks a constraint; `field` is a dotted path
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Telemetry kind outside the supported set
    #[error("unknown telemetry kind: {kind}")]
    UnknownTelemetryKind { kind: String },

    /// Caller broke an estimator precondition, e.g. signals of unequal
    /// length handed to the correlator
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// No usable persisted lag: missing, malformed, or learned on another
    /// vehicle
    #[error("persisted state '{key}' unavailable: {message}")]
    PersistenceUnavailable { key: String, message: String },

    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn persistence(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = ContractError::config_validation("cadence.pose_frequency_hz", "must be positive");
        assert_eq!(
            err.to_string(),
            "config validation error at 'cadence.pose_frequency_hz': must be positive"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "params/LiveDelay");
        let err: ContractError = io.into();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
