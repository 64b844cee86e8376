//! Per-record debug gating
//!
//! The policy only answers whether a record should pause for inspection.
//! How the pause happens is up to a [`DebugHook`].

use async_trait::async_trait;

use crate::record::{RecordClass, TestRecord};

/// Four independent debug gates, all off by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugPolicy {
    breakpoints: bool,
    every_record: bool,
    driver_commands: bool,
    test_commands: bool,
}

impl DebugPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breakpoints_enabled(&self) -> bool {
        self.breakpoints
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.breakpoints = enabled;
    }

    pub fn record_debug_enabled(&self) -> bool {
        self.every_record
    }

    pub fn set_record_debug_enabled(&mut self, enabled: bool) {
        self.every_record = enabled;
    }

    pub fn driver_command_debug_enabled(&self) -> bool {
        self.driver_commands
    }

    pub fn set_driver_command_debug_enabled(&mut self, enabled: bool) {
        self.driver_commands = enabled;
    }

    pub fn test_command_debug_enabled(&self) -> bool {
        self.test_commands
    }

    pub fn set_test_command_debug_enabled(&mut self, enabled: bool) {
        self.test_commands = enabled;
    }

    /// Whether a record of `class` should pause before it runs
    pub fn should_pause(&self, class: RecordClass) -> bool {
        if self.every_record {
            return true;
        }
        match class {
            RecordClass::Breakpoint => self.breakpoints,
            RecordClass::DriverCommand => self.driver_commands,
            RecordClass::TestCommand => self.test_commands,
            RecordClass::Generic => false,
        }
    }
}

/// Performs the actual pause when the policy asks for one
#[async_trait]
pub trait DebugHook: Send {
    async fn pause(&mut self, record: &TestRecord);
}

/// Logs the pause and carries on
#[derive(Debug, Default)]
pub struct LogPause;

#[async_trait]
impl DebugHook for LogPause {
    async fn pause(&mut self, record: &TestRecord) {
        tracing::info!(
            class = %record.class,
            location = %record.location(),
            record = %record.payload,
            "Debug pause"
        );
    }
}
