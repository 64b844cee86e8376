//! Flow control: which block the driver goes to after a record
//!
//! [`FlowControlTable`] only stores outcome → block bindings. Turning a
//! numeric status into an [`Outcome`] is a separate, caller-owned mapping
//! ([`outcome_for`]).

use std::fmt;

use crate::record::{RecordStatus, StatusCode};

/// Named classification of a dispatch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    ScriptNotExecuted,
    ExitTable,
    NoScriptFailure,
    ScriptFailure,
    ScriptWarning,
    IoFailure,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::ScriptNotExecuted,
        Outcome::ExitTable,
        Outcome::NoScriptFailure,
        Outcome::ScriptFailure,
        Outcome::ScriptWarning,
        Outcome::IoFailure,
    ];

    fn index(self) -> usize {
        match self {
            Outcome::ScriptNotExecuted => 0,
            Outcome::ExitTable => 1,
            Outcome::NoScriptFailure => 2,
            Outcome::ScriptFailure => 3,
            Outcome::ScriptWarning => 4,
            Outcome::IoFailure => 5,
        }
    }

    /// Configuration item naming this outcome's block, e.g. `ScriptFailureBlock`
    pub fn config_item(self) -> &'static str {
        match self {
            Outcome::ScriptNotExecuted => "ScriptNotExecutedBlock",
            Outcome::ExitTable => "ExitTableBlock",
            Outcome::NoScriptFailure => "NoScriptFailureBlock",
            Outcome::ScriptFailure => "ScriptFailureBlock",
            Outcome::ScriptWarning => "ScriptWarningBlock",
            Outcome::IoFailure => "IOFailureBlock",
        }
    }

    /// Driver command that assigns this outcome's block, e.g. `SetScriptFailureBlock`
    pub fn from_set_command(command: &str) -> Option<Self> {
        let command = command.trim();
        Self::ALL.into_iter().find(|outcome| {
            command.eq_ignore_ascii_case(&format!("Set{}", outcome.config_item()))
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let item = self.config_item();
        f.write_str(item.strip_suffix("Block").unwrap_or(item))
    }
}

/// Default status → outcome mapping
///
/// Codes without an outcome (ignore, branch, unknown) return `None` and the
/// driver continues sequentially.
pub fn outcome_for(code: StatusCode) -> Option<Outcome> {
    match code {
        StatusCode::NO_SCRIPT_FAILURE | StatusCode::TEST_SUCCESS_LOGGED => {
            Some(Outcome::NoScriptFailure)
        }
        StatusCode::SCRIPT_WARNING | StatusCode::TEST_WARNING_LOGGED => {
            Some(Outcome::ScriptWarning)
        }
        StatusCode::GENERAL_SCRIPT_FAILURE | StatusCode::TEST_FAILURE_LOGGED => {
            Some(Outcome::ScriptFailure)
        }
        StatusCode::INVALID_FILE_IO => Some(Outcome::IoFailure),
        StatusCode::SCRIPT_NOT_EXECUTED => Some(Outcome::ScriptNotExecuted),
        StatusCode::EXIT_TABLE_COMMAND => Some(Outcome::ExitTable),
        _ => None,
    }
}

/// Outcome → block ID bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowControlTable {
    blocks: [Option<String>; 6],
}

impl FlowControlTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a block. An empty ID unassigns the slot.
    pub fn set(&mut self, outcome: Outcome, block: impl Into<String>) {
        let block = block.into();
        self.blocks[outcome.index()] = Some(block);
    }

    /// Unassign a slot
    pub fn clear(&mut self, outcome: Outcome) {
        self.blocks[outcome.index()] = None;
    }

    /// True iff a non-empty block ID is bound
    pub fn is_valid(&self, outcome: Outcome) -> bool {
        self.blocks[outcome.index()]
            .as_deref()
            .is_some_and(|block| !block.is_empty())
    }

    /// Stored value for the slot; an empty string when unassigned
    ///
    /// Only meaningful after [`is_valid`](Self::is_valid) returned true.
    pub fn get(&self, outcome: Outcome) -> &str {
        self.blocks[outcome.index()].as_deref().unwrap_or_default()
    }

    /// Checked access: the block ID only when the slot is valid
    pub fn block(&self, outcome: Outcome) -> Option<&str> {
        self.is_valid(outcome).then(|| self.get(outcome))
    }
}

/// What the driver does after a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Proceed to the following record
    Continue,
    /// Jump to the named block
    Jump(String),
    /// End the run
    Stop,
}

/// Post-dispatch decision for a representative status
///
/// Returns the next step and the outcome that caused a jump, if any.
pub fn decide(table: &FlowControlTable, status: &RecordStatus) -> (Next, Option<Outcome>) {
    if status.code == StatusCode::BRANCH_TO_BLOCKID {
        let block = status.message.trim();
        if block.is_empty() {
            tracing::error!("Branch requested without a block ID");
            return (Next::Continue, None);
        }
        return (Next::Jump(block.to_string()), None);
    }

    let Some(outcome) = outcome_for(status.code) else {
        return (Next::Continue, None);
    };

    match table.block(outcome) {
        Some(block) => (Next::Jump(block.to_string()), Some(outcome)),
        None if outcome == Outcome::ExitTable => (Next::Stop, None),
        None => (Next::Continue, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_slot_starts_invalid() {
        let table = FlowControlTable::new();
        for outcome in Outcome::ALL {
            assert!(!table.is_valid(outcome));
            assert_eq!(table.get(outcome), "");
            assert_eq!(table.block(outcome), None);
        }
    }

    #[test]
    fn test_set_makes_slot_valid_with_last_value() {
        let mut table = FlowControlTable::new();
        for outcome in Outcome::ALL {
            table.set(outcome, "FIRST");
            table.set(outcome, format!("BLOCK_{outcome}"));
            assert!(table.is_valid(outcome));
            assert_eq!(table.get(outcome), format!("BLOCK_{outcome}"));
        }
    }

    #[test]
    fn test_script_failure_scenario() {
        let mut table = FlowControlTable::new();
        assert!(!table.is_valid(Outcome::ScriptFailure));
        table.set(Outcome::ScriptFailure, "BLOCK9");
        assert!(table.is_valid(Outcome::ScriptFailure));
        assert_eq!(table.get(Outcome::ScriptFailure), "BLOCK9");
        assert!(!table.is_valid(Outcome::ScriptWarning));
    }

    #[test]
    fn test_empty_value_unassigns() {
        let mut table = FlowControlTable::new();
        table.set(Outcome::IoFailure, "IO");
        table.set(Outcome::IoFailure, "");
        assert!(!table.is_valid(Outcome::IoFailure));
        table.set(Outcome::IoFailure, "IO");
        table.clear(Outcome::IoFailure);
        assert!(!table.is_valid(Outcome::IoFailure));
    }

    #[test]
    fn test_set_command_names() {
        assert_eq!(
            Outcome::from_set_command("setscriptfailureblock"),
            Some(Outcome::ScriptFailure)
        );
        assert_eq!(
            Outcome::from_set_command("SetIOFailureBlock"),
            Some(Outcome::IoFailure)
        );
        assert_eq!(Outcome::from_set_command("SetNothingBlock"), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(outcome_for(StatusCode::NO_SCRIPT_FAILURE), Some(Outcome::NoScriptFailure));
        assert_eq!(outcome_for(StatusCode::TEST_FAILURE_LOGGED), Some(Outcome::ScriptFailure));
        assert_eq!(outcome_for(StatusCode::INVALID_FILE_IO), Some(Outcome::IoFailure));
        assert_eq!(outcome_for(StatusCode::SCRIPT_NOT_EXECUTED), Some(Outcome::ScriptNotExecuted));
        assert_eq!(outcome_for(StatusCode::EXIT_TABLE_COMMAND), Some(Outcome::ExitTable));
        assert_eq!(outcome_for(StatusCode::IGNORE_RETURN_CODE), None);
        assert_eq!(outcome_for(StatusCode(99)), None);
    }

    #[test]
    fn test_decide_jumps_only_when_valid() {
        let mut table = FlowControlTable::new();
        let failure = RecordStatus::failure("boom");
        assert_eq!(decide(&table, &failure), (Next::Continue, None));

        table.set(Outcome::ScriptFailure, "RECOVER");
        assert_eq!(
            decide(&table, &failure),
            (Next::Jump("RECOVER".to_string()), Some(Outcome::ScriptFailure))
        );
    }

    #[test]
    fn test_exit_table_without_block_stops() {
        let mut table = FlowControlTable::new();
        let exit = RecordStatus::new(StatusCode::EXIT_TABLE_COMMAND, "");
        assert_eq!(decide(&table, &exit), (Next::Stop, None));

        table.set(Outcome::ExitTable, "CLEANUP");
        assert_eq!(
            decide(&table, &exit),
            (Next::Jump("CLEANUP".to_string()), Some(Outcome::ExitTable))
        );
    }

    #[test]
    fn test_branch_uses_status_message() {
        let table = FlowControlTable::new();
        let branch = RecordStatus::new(StatusCode::BRANCH_TO_BLOCKID, " TARGET ");
        assert_eq!(decide(&table, &branch), (Next::Jump("TARGET".to_string()), None));

        let empty = RecordStatus::new(StatusCode::BRANCH_TO_BLOCKID, "");
        assert_eq!(decide(&table, &empty), (Next::Continue, None));
    }
}
