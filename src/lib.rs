//! Test driver dispatch core
//!
//! Hands test records to execution engines, collects their statuses and
//! decides from a flow-control table where the run goes next. Debug gating
//! and all tunables come through a layered configuration chain.

pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod debug;
pub mod driver;
pub mod engine;
pub mod flow;
pub mod ipc;
pub mod record;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use config::{ConfigResolver, ConfigSource};
pub use driver::{DispatchMode, Driver, Script};
pub use engine::{DispatchCollector, DispatchResult, EngineHandle, RecordProcessor};
pub use record::{RecordStatus, StatusCode, TestRecord};
