//! Error types for the test driver
//!
//! "Not found" answers from configuration lookups and unassigned flow-control
//! slots are not errors; they are modelled with `Option` at the call sites.
//! This enum is reserved for real faults: unreadable stores, broken engine
//! transports, and handshakes that never complete.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the test driver
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration store '{path}': {reason}")]
    ConfigParse { path: String, reason: String },

    #[error("Invalid override '{0}'. Expected Section.Item=value")]
    InvalidOverride(String),

    // === Script Errors ===
    #[error("Failed to read script '{path}': {error}")]
    ScriptRead { path: String, error: String },

    // === Handshake / Engine Errors ===
    #[error("Engine '{engine}' did not complete the record within {millis} ms")]
    HandshakeTimeout { engine: String, millis: u64 },

    #[error("Engine '{0}' closed the handshake before completing the record")]
    EngineDisconnected(String),

    #[error("Engine '{0}' has been shut down")]
    EngineShutdown(String),

    #[error("Engine '{engine}' failed: {message}")]
    EngineFailed { engine: String, message: String },

    #[error("Unknown engine '{0}'. Use 'shell' or 'remote:<name>'")]
    UnknownEngine(String),

    // === IPC Errors ===
    #[error("Engine '{0}' is not listening. Start it with 'testdriver engine --name {0}'")]
    EngineNotRunning(String),

    #[error("Engine communication error: {0}")]
    EngineCommunication(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Run Errors ===
    #[error("{0} record(s) failed")]
    RecordsFailed(usize),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration parse error for a store path
    pub fn config_parse(path: &str, reason: impl ToString) -> Self {
        Self::ConfigParse {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a handshake timeout error
    pub fn handshake_timeout(engine: &str, timeout: std::time::Duration) -> Self {
        Self::HandshakeTimeout {
            engine: engine.to_string(),
            millis: timeout.as_millis() as u64,
        }
    }

    /// Create an engine failure error
    pub fn engine_failed(engine: &str, message: impl ToString) -> Self {
        Self::EngineFailed {
            engine: engine.to_string(),
            message: message.to_string(),
        }
    }
}

/// IPC-serializable error for remote engine responses
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IpcError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for IpcError {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::HandshakeTimeout { .. } => "TIMEOUT",
            Error::EngineDisconnected(_) => "ENGINE_DISCONNECTED",
            Error::EngineShutdown(_) => "ENGINE_SHUTDOWN",
            Error::EngineFailed { .. } => "ENGINE_FAILED",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl IpcError {
    /// Map a remote error back to our error types where possible
    pub fn into_error(self, engine: &str) -> Error {
        match self.code.as_str() {
            "ENGINE_SHUTDOWN" => Error::EngineShutdown(engine.to_string()),
            "ENGINE_DISCONNECTED" => Error::EngineDisconnected(engine.to_string()),
            "ENGINE_FAILED" => Error::engine_failed(engine, self.message),
            _ => Error::EngineCommunication(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_error_round_trips_shutdown() {
        let ipc = IpcError::from(&Error::EngineShutdown("shell".to_string()));
        assert_eq!(ipc.code, "ENGINE_SHUTDOWN");
        assert!(matches!(
            ipc.into_error("shell"),
            Error::EngineShutdown(name) if name == "shell"
        ));
    }

    #[test]
    fn test_unknown_ipc_code_becomes_communication_error() {
        let ipc = IpcError {
            code: "SOMETHING_ELSE".to_string(),
            message: "boom".to_string(),
        };
        assert!(matches!(ipc.into_error("x"), Error::EngineCommunication(m) if m == "boom"));
    }
}
