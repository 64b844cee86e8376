//! IPC protocol message types
//!
//! Defines the request/response format for driver ↔ remote engine
//! communication. Uses a simple length-prefixed JSON protocol.

use serde::{Deserialize, Serialize};

use crate::common::error::IpcError;
use crate::record::TestRecord;

/// IPC request from driver to engine
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for matching responses
    pub id: u64,
    /// The command to execute
    pub command: Command,
}

/// IPC response from engine to driver
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response corresponds to
    pub id: u64,
    /// Whether the command succeeded
    pub success: bool,
    /// Processed record, for `Process` requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TestRecord>,
    /// Error information on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcError>,
}

impl Response {
    /// Create a response carrying a processed record
    pub fn processed(id: u64, record: TestRecord) -> Self {
        Self {
            id,
            success: true,
            record: Some(record),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: IpcError) -> Self {
        Self {
            id,
            success: false,
            record: None,
            error: Some(error),
        }
    }

    /// Create a success response with no data
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            success: true,
            record: None,
            error: None,
        }
    }
}

/// Commands understood by a served engine
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Execute one record and return it with its status filled in
    Process { record: TestRecord },
    /// Liveness check
    Ping,
    /// Stop serving
    Shutdown,
}
