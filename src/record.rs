//! Test records and status codes
//!
//! A [`TestRecord`] is one script line handed to engines. Engines answer with
//! a [`RecordStatus`]: a numeric [`StatusCode`] plus a human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric status returned by an engine for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    /// A warning occurred
    pub const SCRIPT_WARNING: Self = Self(-2);
    /// No known error or warning occurred
    pub const NO_SCRIPT_FAILURE: Self = Self(-1);
    /// An error occurred
    pub const GENERAL_SCRIPT_FAILURE: Self = Self(0);
    /// An IO (file/input) error occurred
    pub const INVALID_FILE_IO: Self = Self(2);
    /// Nobody accepted responsibility for the record
    pub const SCRIPT_NOT_EXECUTED: Self = Self(4);
    /// A test failure was already logged by the command
    pub const TEST_FAILURE_LOGGED: Self = Self(5);
    /// A test success was already logged by the command
    pub const TEST_SUCCESS_LOGGED: Self = Self(6);
    /// A test warning was already logged by the command
    pub const TEST_WARNING_LOGGED: Self = Self(7);
    /// The table should end early
    pub const EXIT_TABLE_COMMAND: Self = Self(8);
    /// Somebody else already handled bookkeeping for this record
    pub const IGNORE_RETURN_CODE: Self = Self(16);
    /// Branch to the block ID carried in the status message
    pub const BRANCH_TO_BLOCKID: Self = Self(256);

    /// Severity rank used when several engines answer the same record
    pub fn severity(self) -> u8 {
        match self {
            Self::EXIT_TABLE_COMMAND => 6,
            Self::INVALID_FILE_IO => 5,
            Self::GENERAL_SCRIPT_FAILURE | Self::TEST_FAILURE_LOGGED => 4,
            Self::SCRIPT_NOT_EXECUTED => 3,
            Self::SCRIPT_WARNING | Self::TEST_WARNING_LOGGED => 2,
            Self::BRANCH_TO_BLOCKID => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status code plus message, as written back by an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RecordStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The status every record starts with
    pub fn not_executed() -> Self {
        Self::new(StatusCode::SCRIPT_NOT_EXECUTED, "")
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NO_SCRIPT_FAILURE, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GENERAL_SCRIPT_FAILURE, message)
    }
}

impl Default for RecordStatus {
    fn default() -> Self {
        Self::not_executed()
    }
}

/// Which debug gate applies to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordClass {
    Breakpoint,
    Generic,
    DriverCommand,
    TestCommand,
}

impl RecordClass {
    /// Classify by record type (the first field of a script line)
    pub fn from_record_type(record_type: &str) -> Self {
        match record_type.trim().to_ascii_uppercase().as_str() {
            "BP" => Self::Breakpoint,
            "C" | "CW" | "CF" => Self::DriverCommand,
            "T" | "TW" | "TF" => Self::TestCommand,
            _ => Self::Generic,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Breakpoint => "breakpoint",
            Self::Generic => "generic",
            Self::DriverCommand => "driver-command",
            Self::TestCommand => "test-command",
        };
        f.write_str(name)
    }
}

/// One unit of dispatchable work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Debug-gate class derived from the record type
    pub class: RecordClass,
    /// Raw record text, opaque to the dispatch core
    pub payload: String,
    /// Field separator used by [`field`](Self::field)
    pub separator: String,
    /// Script name the record came from
    pub source: String,
    /// 1-based line number in the script
    pub line: usize,
    /// Output written back by the engine that processed the record
    #[serde(default)]
    pub status: RecordStatus,
}

impl TestRecord {
    /// Build a record from raw text, classifying it by its first field
    pub fn new(payload: impl Into<String>, separator: impl Into<String>) -> Self {
        let payload = payload.into();
        let separator = separator.into();
        let class = RecordClass::from_record_type(first_field(&payload, &separator));
        Self {
            class,
            payload,
            separator,
            source: String::new(),
            line: 0,
            status: RecordStatus::not_executed(),
        }
    }

    /// Attach script location
    pub fn at(mut self, source: impl Into<String>, line: usize) -> Self {
        self.source = source.into();
        self.line = line;
        self
    }

    /// Trimmed, unquoted field `index` (0 = record type)
    pub fn field(&self, index: usize) -> Option<&str> {
        self.payload
            .split(self.separator.as_str())
            .nth(index)
            .map(unquote)
    }

    /// Record type, upper-cased
    pub fn record_type(&self) -> String {
        self.field(0).unwrap_or_default().to_ascii_uppercase()
    }

    /// Command name for driver/engine/test records
    ///
    /// Driver (`C*`) and engine (`E`) commands carry it in field 1; test
    /// records (`T*`) carry window and component first, so field 3.
    pub fn command(&self) -> Option<&str> {
        let index = match self.class {
            RecordClass::TestCommand => 3,
            _ => 1,
        };
        self.field(index).filter(|s| !s.is_empty())
    }

    /// Trimmed, unquoted fields from `index` to the end
    pub fn fields_from(&self, index: usize) -> Vec<&str> {
        self.payload
            .split(self.separator.as_str())
            .skip(index)
            .map(unquote)
            .collect()
    }

    pub fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }

    /// Short location string for logs
    pub fn location(&self) -> String {
        format!("{}:{}", self.source, self.line)
    }
}

fn first_field<'a>(payload: &'a str, separator: &str) -> &'a str {
    payload
        .split(separator)
        .next()
        .map(unquote)
        .unwrap_or_default()
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}
