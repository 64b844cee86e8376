//! The dispatch loop
//!
//! For every record the [`Driver`] asks the [`DebugPolicy`] whether to
//! pause, clears its [`DispatchCollector`], routes the record to its engines
//! and lets the [`FlowControlTable`] pick what happens next.

mod commands;
mod counts;
mod script;

use std::fmt;
use std::str::FromStr;

use crate::common::config::DriverSettings;
use crate::common::{Error, Result};
use crate::debug::{DebugHook, DebugPolicy, LogPause};
use crate::engine::{DispatchCollector, DispatchResult, EngineHandle};
use crate::flow::{decide, FlowControlTable, Next, Outcome};
use crate::record::{RecordClass, RecordStatus, StatusCode, TestRecord};

pub use commands::handle_flow_command;
pub use counts::StatusCounts;
pub use script::{Script, BLOCK_RECORD, SKIP_RECORD};

/// Engine identity used for results the driver produces itself
pub const DRIVER_ENGINE: &str = "driver";

/// How a record is routed to the configured engines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Try engines in order until one accepts the record
    #[default]
    First,
    /// Send the record to every engine
    All,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "all" => Ok(Self::All),
            other => Err(format!("unknown dispatch mode '{}', expected first or all", other)),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Result of running one script
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub counts: StatusCounts,
    /// True when an `ExitTable` ended the run before the last record
    pub exited_early: bool,
}

pub struct Driver {
    engines: Vec<Box<dyn EngineHandle>>,
    collector: DispatchCollector,
    debug: DebugPolicy,
    flow: FlowControlTable,
    mode: DispatchMode,
    hook: Box<dyn DebugHook>,
}

impl Driver {
    /// Create a driver with no engines, seeded from resolved settings
    pub fn new(settings: &DriverSettings) -> Self {
        Self {
            engines: Vec::new(),
            collector: DispatchCollector::new(),
            debug: settings.debug,
            flow: settings.flow.clone(),
            mode: settings.dispatch_mode,
            hook: Box::new(LogPause),
        }
    }

    /// Append an engine; engines are tried in the order they were added
    pub fn with_engine(mut self, engine: impl EngineHandle + 'static) -> Self {
        self.add_engine(Box::new(engine));
        self
    }

    pub fn add_engine(&mut self, engine: Box<dyn EngineHandle>) {
        tracing::debug!(engine = %engine.name(), "Engine added");
        self.engines.push(engine);
    }

    pub fn with_debug_hook(mut self, hook: impl DebugHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn debug_policy(&self) -> &DebugPolicy {
        &self.debug
    }

    pub fn debug_policy_mut(&mut self) -> &mut DebugPolicy {
        &mut self.debug
    }

    pub fn flow(&self) -> &FlowControlTable {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut FlowControlTable {
        &mut self.flow
    }

    /// Results of the most recent dispatch cycle
    pub fn collector(&self) -> &DispatchCollector {
        &self.collector
    }

    /// Run one dispatch cycle for `record`
    ///
    /// Writes the representative status into the record and returns it.
    /// Engine errors never escape: they are recorded as script failures.
    pub async fn dispatch(&mut self, record: &mut TestRecord) -> RecordStatus {
        if self.debug.should_pause(record.class) {
            self.hook.pause(record).await;
        }

        self.collector.clear();

        if let Some(status) = self.handle_locally(record) {
            self.collector
                .record(DispatchResult::new(DRIVER_ENGINE, status.clone()));
            record.set_status(status.clone());
            return status;
        }

        for engine in self.engines.iter_mut() {
            let status = match engine.dispatch(record).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        engine = %engine.name(),
                        record = %record.location(),
                        "Engine failed: {}",
                        e
                    );
                    RecordStatus::failure(e.to_string())
                }
            };
            tracing::trace!(engine = %engine.name(), code = %status.code, "Engine answered");
            let accepted = status.code != StatusCode::SCRIPT_NOT_EXECUTED;
            self.collector
                .record(DispatchResult::new(engine.name(), status));
            if accepted && self.mode == DispatchMode::First {
                break;
            }
        }

        let status = representative(self.mode, self.collector.results());
        record.set_status(status.clone());
        status
    }

    fn handle_locally(&mut self, record: &TestRecord) -> Option<RecordStatus> {
        match record.class {
            RecordClass::Breakpoint => {
                Some(RecordStatus::new(StatusCode::IGNORE_RETURN_CODE, "breakpoint"))
            }
            RecordClass::DriverCommand => handle_flow_command(&mut self.flow, record),
            _ => None,
        }
    }

    /// Run every record of `script`, following flow-control jumps
    pub async fn run(&mut self, script: &Script) -> RunSummary {
        let records = script.records();
        let mut summary = RunSummary::default();
        let mut index = 0;

        tracing::info!(script = %script.name(), records = records.len(), mode = %self.mode, "Running script");

        while index < records.len() {
            let mut record = records[index].clone();
            index += 1;

            match record.record_type().as_str() {
                BLOCK_RECORD => continue,
                SKIP_RECORD => {
                    summary.counts.record_skip();
                    continue;
                }
                _ => {}
            }

            let status = self.dispatch(&mut record).await;
            summary.counts.tally(status.code);
            if status.code == StatusCode::SCRIPT_NOT_EXECUTED {
                tracing::warn!(record = %record.location(), "No engine executed record");
            }

            let (next, outcome) = decide(&self.flow, &status);
            if outcome == Some(Outcome::NoScriptFailure) {
                self.flow.clear(Outcome::NoScriptFailure);
            }

            match next {
                Next::Continue => {}
                Next::Stop => {
                    tracing::info!(record = %record.location(), "Exiting table");
                    summary.exited_early = index < records.len();
                    break;
                }
                Next::Jump(block) => match script.find_block(&block) {
                    Some(target) => {
                        tracing::info!(record = %record.location(), block = %block, "Branching");
                        index = target;
                    }
                    None => {
                        tracing::error!(record = %record.location(), block = %block, "Block not found");
                        summary.counts.record_failure();
                    }
                },
            }
        }

        summary
    }

    /// Shut every engine down, reporting the first failure
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for engine in self.engines.iter_mut() {
            if let Err(e) = engine.shutdown().await {
                tracing::warn!(engine = %engine.name(), "Shutdown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Pick the status that stands for the whole cycle
///
/// `First` uses the last answer. `All` ignores "not executed" answers if any
/// engine accepted, then takes the most severe, earliest on ties.
fn representative(mode: DispatchMode, results: &[DispatchResult]) -> RecordStatus {
    match mode {
        DispatchMode::First => results
            .last()
            .map(|r| r.status().clone())
            .unwrap_or_default(),
        DispatchMode::All => {
            let accepted = results
                .iter()
                .any(|r| r.status().code != StatusCode::SCRIPT_NOT_EXECUTED);
            results
                .iter()
                .filter(|r| !accepted || r.status().code != StatusCode::SCRIPT_NOT_EXECUTED)
                .fold(None::<&RecordStatus>, |worst, r| match worst {
                    Some(w) if w.code.severity() >= r.status().code.severity() => Some(w),
                    _ => Some(r.status()),
                })
                .cloned()
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InProcessEngine, RecordProcessor};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Answers records whose command matches `command` with `status`
    struct Answer {
        command: &'static str,
        status: RecordStatus,
    }

    #[async_trait]
    impl RecordProcessor for Answer {
        async fn process(&mut self, record: &mut TestRecord) {
            if record.command() == Some(self.command) {
                record.set_status(self.status.clone());
            }
        }
    }

    fn answer(name: &str, command: &'static str, status: RecordStatus) -> InProcessEngine {
        InProcessEngine::spawn(name, Answer { command, status })
    }

    struct Broken;

    #[async_trait]
    impl EngineHandle for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn dispatch(&mut self, _record: &TestRecord) -> Result<RecordStatus> {
            Err(Error::EngineDisconnected("broken".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl DebugHook for Recorder {
        async fn pause(&mut self, record: &TestRecord) {
            self.0.lock().unwrap().push(record.payload.clone());
        }
    }

    fn driver() -> Driver {
        Driver::new(&DriverSettings::default())
    }

    #[tokio::test]
    async fn test_first_mode_stops_at_first_taker() {
        let mut driver = driver()
            .with_engine(answer("a", "Other", RecordStatus::ok("a")))
            .with_engine(answer("b", "Click", RecordStatus::ok("b")))
            .with_engine(answer("c", "Click", RecordStatus::failure("c")));

        let mut record = TestRecord::new("T, Win, Btn, Click", ",");
        let status = driver.dispatch(&mut record).await;

        assert_eq!(status, RecordStatus::ok("b"));
        assert_eq!(record.status, status);
        let engines: Vec<_> = driver.collector().results().iter().map(|r| r.engine()).collect();
        assert_eq!(engines, vec!["a", "b"]);
        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_all_mode_takes_most_severe_accepted() {
        let mut driver = driver()
            .with_mode(DispatchMode::All)
            .with_engine(answer("warn", "Go", RecordStatus::new(StatusCode::SCRIPT_WARNING, "w")))
            .with_engine(answer("idle", "Other", RecordStatus::ok("")))
            .with_engine(answer("fail", "Go", RecordStatus::failure("f")))
            .with_engine(answer("fail2", "Go", RecordStatus::failure("f2")));

        let status = driver.dispatch(&mut TestRecord::new("E, Go", ",")).await;
        assert_eq!(status, RecordStatus::failure("f"));
        assert_eq!(driver.collector().len(), 4);
    }

    #[tokio::test]
    async fn test_nobody_accepts_is_not_executed() {
        let mut driver = driver()
            .with_mode(DispatchMode::All)
            .with_engine(answer("a", "Other", RecordStatus::ok("")));
        let status = driver.dispatch(&mut TestRecord::new("E, Go", ",")).await;
        assert_eq!(status.code, StatusCode::SCRIPT_NOT_EXECUTED);

        let mut empty = Driver::new(&DriverSettings::default());
        let status = empty.dispatch(&mut TestRecord::new("E, Go", ",")).await;
        assert_eq!(status.code, StatusCode::SCRIPT_NOT_EXECUTED);
        assert!(empty.collector().is_empty());
    }

    #[tokio::test]
    async fn test_engine_error_becomes_failure_and_routing_continues() {
        let mut driver = driver()
            .with_engine(Broken)
            .with_engine(answer("b", "Go", RecordStatus::ok("b")));
        let status = driver.dispatch(&mut TestRecord::new("E, Go", ",")).await;

        // a failure counts as accepted in first mode
        assert_eq!(status.code, StatusCode::GENERAL_SCRIPT_FAILURE);
        assert_eq!(driver.collector().len(), 1);
        assert!(driver.collector().results()[0]
            .status()
            .message
            .contains("broken"));
    }

    #[tokio::test]
    async fn test_collector_cleared_between_cycles() {
        let mut driver = driver()
            .with_mode(DispatchMode::All)
            .with_engine(answer("a", "Go", RecordStatus::ok("a")))
            .with_engine(answer("b", "Go", RecordStatus::ok("b")));
        driver.dispatch(&mut TestRecord::new("E, Go", ",")).await;
        driver.dispatch(&mut TestRecord::new("E, Go", ",")).await;
        assert_eq!(driver.collector().len(), 2);
    }

    #[tokio::test]
    async fn test_debug_hook_follows_policy() {
        let recorder = Recorder::default();
        let mut driver = driver().with_debug_hook(recorder.clone());
        driver.debug_policy_mut().set_breakpoints_enabled(true);
        driver.debug_policy_mut().set_test_command_debug_enabled(true);

        for line in ["BP", "E, Go", "T, W, C, Click", "C, ExitTable"] {
            driver.dispatch(&mut TestRecord::new(line, ",")).await;
        }
        assert_eq!(*recorder.0.lock().unwrap(), vec!["BP", "T, W, C, Click"]);
    }

    #[tokio::test]
    async fn test_run_follows_failure_block() {
        let script = Script::parse(
            "t",
            "C, SetScriptFailureBlock, Recover\n\
             E, Fail\n\
             E, Pass, skipped by jump\n\
             B, Recover\n\
             E, Pass\n",
            ",",
        );
        let mut driver = driver()
            .with_engine(answer("fail", "Fail", RecordStatus::failure("boom")))
            .with_engine(answer("pass", "Pass", RecordStatus::ok("")));

        let summary = driver.run(&script).await;
        assert_eq!(summary.counts.records, 3);
        assert_eq!(summary.counts.passed, 2);
        assert_eq!(summary.counts.failures, 1);
        assert!(!summary.exited_early);
    }

    #[tokio::test]
    async fn test_no_script_failure_block_is_one_shot() {
        let script = Script::parse(
            "t",
            "C, SetNoScriptFailureBlock, Done\n\
             E, Pass\n\
             B, Middle\n\
             S, ignored\n\
             B, Done\n\
             E, Pass\n",
            ",",
        );
        let mut driver = driver().with_engine(answer("pass", "Pass", RecordStatus::ok("")));

        let summary = driver.run(&script).await;
        assert_eq!(summary.counts.records, 3);
        assert_eq!(summary.counts.passed, 2);
        assert_eq!(summary.counts.skipped, 0);
        assert!(!driver.flow().is_valid(Outcome::NoScriptFailure));
    }

    #[tokio::test]
    async fn test_exit_table_without_block_stops() {
        let script = Script::parse("t", "E, Pass\nC, ExitTable\nE, Pass\nS, x\n", ",");
        let mut driver = driver().with_engine(answer("pass", "Pass", RecordStatus::ok("")));

        let summary = driver.run(&script).await;
        // the exit record itself counts as a pass
        assert_eq!(summary.counts.passed, 2);
        assert_eq!(summary.counts.skipped, 0);
        assert!(summary.exited_early);
    }

    #[tokio::test]
    async fn test_exit_table_with_block_jumps() {
        let script = Script::parse(
            "t",
            "C, SetExitTableBlock, Cleanup\nC, ExitTable\nE, Fail\nB, Cleanup\nE, Pass\n",
            ",",
        );
        let mut driver = driver()
            .with_engine(answer("fail", "Fail", RecordStatus::failure("")))
            .with_engine(answer("pass", "Pass", RecordStatus::ok("")));

        let summary = driver.run(&script).await;
        assert_eq!(summary.counts.failures, 0);
        assert_eq!(summary.counts.passed, 3);
        assert!(!summary.exited_early);
    }

    #[tokio::test]
    async fn test_run_follows_not_executed_block() {
        let script = Script::parse(
            "t",
            "C, SetScriptNotExecutedBlock, Missing
             E, Nobody
             E, Pass, skipped by jump
             B, Missing
             E, Pass
",
            ",",
        );
        let mut driver = driver().with_engine(answer("pass", "Pass", RecordStatus::ok("")));

        let summary = driver.run(&script).await;
        assert_eq!(summary.counts.records, 3);
        assert_eq!(summary.counts.passed, 2);
        assert_eq!(summary.counts.not_executed, 1);
        assert_eq!(summary.counts.failed(), 1);
        assert!(!summary.exited_early);
        assert_eq!(driver.flow().block(Outcome::ScriptNotExecuted), Some("Missing"));
        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_block_counts_failure_and_continues() {
        let script = Script::parse("t", "E, Branch\nE, Pass\n", ",");
        let mut driver = driver()
            .with_engine(answer(
                "branch",
                "Branch",
                RecordStatus::new(StatusCode::BRANCH_TO_BLOCKID, "Nowhere"),
            ))
            .with_engine(answer("pass", "Pass", RecordStatus::ok("")));

        let summary = driver.run(&script).await;
        assert_eq!(summary.counts.failures, 1);
        assert_eq!(summary.counts.passed, 1);
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("First".parse::<DispatchMode>(), Ok(DispatchMode::First));
        assert_eq!(" ALL ".parse::<DispatchMode>(), Ok(DispatchMode::All));
        assert!("some".parse::<DispatchMode>().is_err());
        assert_eq!(DispatchMode::All.to_string(), "all");
    }
}
