//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Startup errors name the step that failed
//! and the identifier involved (environment variable, address, service name).

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type produced by module authors, both from factories and from
/// `execute`. The harness never inspects it beyond its message.
pub type ModuleError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error enum for the module harness.
#[derive(Error, Debug)]
pub enum Error {
    /// Required environment variable is not set.
    #[error("expected an '{name}' environment variable containing {description}, but none was found")]
    MissingConfiguration { name: String, description: String },

    /// Required environment variable is set to the empty string.
    #[error("the '{name}' environment variable ({description}) was defined, but is empty")]
    EmptyConfiguration { name: String, description: String },

    /// The module factory rejected the serialized params.
    #[error("failed to parse the serialized params and create the module: {0}")]
    Factory(#[source] ModuleError),

    /// Could not reach the orchestrator.
    #[error("failed to connect to the orchestrator at '{addr}': {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Plain TCP to the orchestrator was not explicitly allowed.
    #[error("refusing insecure connection to the orchestrator at '{addr}': set orchestrator.allow_insecure_transport to permit it")]
    InsecureTransport { addr: String },

    /// Could not bind the listening socket.
    #[error("failed to bind the module server on '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Service registration rejected before binding.
    #[error("service registration failed: {0}")]
    Registration(String),

    /// The module's `execute` returned an error (map to MODULE_ERROR).
    #[error("module execution failed: {0}")]
    Module(String),

    /// Error frame returned by the orchestrator API.
    #[error("orchestrator returned {code}: {message}")]
    Orchestrator { code: String, message: String },

    /// Validation errors (map to INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown service or method (map to NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal errors (map to INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeout (map to DEADLINE_EXCEEDED).
    #[error("timeout: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Msgpack encode/decode errors.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wire error code sent back to RPC callers.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::Codec(_) | Error::Serialization(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Module(_) => "MODULE_ERROR",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Connection { .. } | Error::InsecureTransport { .. } => "UNAVAILABLE",
            Error::MissingConfiguration { .. } | Error::EmptyConfiguration { .. } => {
                "FAILED_PRECONDITION"
            }
            Error::Orchestrator { .. }
            | Error::Factory(_)
            | Error::Bind { .. }
            | Error::Registration(_)
            | Error::Internal(_)
            | Error::Io(_) => "INTERNAL",
        }
    }

    /// True for the configuration class of startup errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingConfiguration { .. } | Error::EmptyConfiguration { .. }
        )
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn module(msg: impl Into<String>) -> Self {
        Self::Module(msg.into())
    }

    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_name_the_variable() {
        let missing = Error::MissingConfiguration {
            name: "PARAMS".to_string(),
            description: "the serialized params".to_string(),
        };
        let msg = missing.to_string();
        assert!(msg.contains("PARAMS"));
        assert!(msg.contains("the serialized params"));
        assert!(missing.is_configuration());

        let empty = Error::EmptyConfiguration {
            name: "SOCKET".to_string(),
            description: "the orchestrator socket".to_string(),
        };
        assert!(empty.to_string().contains("SOCKET"));
        assert!(empty.to_string().contains("the orchestrator socket"));
        assert!(empty.is_configuration());
    }

    #[test]
    fn factory_error_keeps_source_text() {
        let err = Error::Factory("unexpected token at line 1".into());
        assert!(err.to_string().contains("unexpected token at line 1"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn wire_codes() {
        assert_eq!(Error::module("boom").to_ipc_error_code(), "MODULE_ERROR");
        assert_eq!(Error::not_found("x").to_ipc_error_code(), "NOT_FOUND");
        assert_eq!(Error::validation("x").to_ipc_error_code(), "INVALID_ARGUMENT");
        assert_eq!(Error::timeout("x").to_ipc_error_code(), "DEADLINE_EXCEEDED");
        assert_eq!(Error::internal("x").to_ipc_error_code(), "INTERNAL");
    }
}
