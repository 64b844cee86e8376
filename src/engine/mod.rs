//! Engines: the actors that execute records
//!
//! The driver only sees [`EngineHandle`]s. Whether a handle reaches its
//! engine through the in-process [`handshake`] or over a socket
//! ([`remote`]) is invisible to the dispatch loop. Engine implementations
//! only see [`RecordProcessor`], so one processor behaves the same behind
//! either transport.

pub mod handshake;
mod inprocess;
pub mod remote;
mod shell;

use async_trait::async_trait;

use crate::common::Result;
use crate::record::{RecordStatus, TestRecord};

pub use inprocess::{serve_handshake, InProcessEngine};
pub use remote::RemoteEngine;
pub use shell::ShellEngine;

/// Driver-side handle to one engine
#[async_trait]
pub trait EngineHandle: Send {
    /// Identity reported in [`DispatchResult`]s
    fn name(&self) -> &str;

    /// Hand a record to the engine and wait for its status
    async fn dispatch(&mut self, record: &TestRecord) -> Result<RecordStatus>;

    /// Ask the engine to stop. Further dispatches fail.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Engine-side record execution
///
/// Implementations write their answer into `record.status`. Leaving it at
/// `SCRIPT_NOT_EXECUTED` means "not mine".
#[async_trait]
pub trait RecordProcessor: Send {
    async fn process(&mut self, record: &mut TestRecord);
}

/// One engine's answer for the current record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    engine: String,
    status: RecordStatus,
}

impl DispatchResult {
    pub fn new(engine: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            engine: engine.into(),
            status,
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn status(&self) -> &RecordStatus {
        &self.status
    }
}

/// Ordered results of one dispatch cycle
///
/// Owned by the driver. Nothing resets it implicitly: the driver clears it
/// before each cycle.
#[derive(Debug, Default)]
pub struct DispatchCollector {
    results: Vec<DispatchResult>,
}

impl DispatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    /// Append one result, preserving call order
    pub fn record(&mut self, result: DispatchResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[DispatchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StatusCode;

    #[test]
    fn test_collector_preserves_order_until_cleared() {
        let mut collector = DispatchCollector::new();
        collector.record(DispatchResult::new("a", RecordStatus::ok("a")));
        collector.record(DispatchResult::new("b", RecordStatus::failure("b")));
        collector.record(DispatchResult::new("a", RecordStatus::not_executed()));

        let engines: Vec<_> = collector.results().iter().map(|r| r.engine()).collect();
        assert_eq!(engines, vec!["a", "b", "a"]);
        assert_eq!(collector.len(), 3);
        assert_eq!(
            collector.results()[1].status().code,
            StatusCode::GENERAL_SCRIPT_FAILURE
        );

        collector.clear();
        assert!(collector.is_empty());
        assert!(collector.results().is_empty());

        collector.record(DispatchResult::new("c", RecordStatus::ok("")));
        assert_eq!(collector.len(), 1);
    }
}
