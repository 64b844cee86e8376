//! Per-run status counters

use serde::Serialize;

use crate::record::StatusCode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Records handed to the dispatch loop
    pub records: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failures: usize,
    pub io_failures: usize,
    pub not_executed: usize,
    /// `S` records passed over
    pub skipped: usize,
}

impl StatusCounts {
    /// Count one dispatched record by its representative status
    pub fn tally(&mut self, code: StatusCode) {
        self.records += 1;
        match code {
            StatusCode::NO_SCRIPT_FAILURE
            | StatusCode::TEST_SUCCESS_LOGGED
            | StatusCode::EXIT_TABLE_COMMAND => self.passed += 1,
            StatusCode::SCRIPT_WARNING | StatusCode::TEST_WARNING_LOGGED => self.warnings += 1,
            StatusCode::GENERAL_SCRIPT_FAILURE | StatusCode::TEST_FAILURE_LOGGED => {
                self.failures += 1
            }
            StatusCode::INVALID_FILE_IO => self.io_failures += 1,
            StatusCode::SCRIPT_NOT_EXECUTED => self.not_executed += 1,
            _ => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Failures of any kind, records no engine executed included
    pub fn failed(&self) -> usize {
        self.failures + self.io_failures + self.not_executed
    }
}
