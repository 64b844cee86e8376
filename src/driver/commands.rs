//! Driver commands the driver answers itself

use crate::flow::{FlowControlTable, Outcome};
use crate::record::{RecordClass, RecordStatus, StatusCode, TestRecord};

const EXIT_TABLE: &str = "ExitTable";

/// Handle a flow-control driver command
///
/// Returns `None` for anything that is not a flow command, so the record
/// goes to the engines. `Set<Outcome>Block, <block>` binds (or with an
/// empty block, unbinds) a slot. Setting the NoScriptFailure block answers
/// `IGNORE_RETURN_CODE` so the command does not trigger the jump it just
/// configured.
pub fn handle_flow_command(
    flow: &mut FlowControlTable,
    record: &TestRecord,
) -> Option<RecordStatus> {
    if record.class != RecordClass::DriverCommand {
        return None;
    }
    let command = record.command()?;

    if command.eq_ignore_ascii_case(EXIT_TABLE) {
        return Some(RecordStatus::new(StatusCode::EXIT_TABLE_COMMAND, EXIT_TABLE));
    }

    let outcome = Outcome::from_set_command(command)?;
    let block = record.field(2).unwrap_or_default();
    if block.is_empty() {
        flow.clear(outcome);
        tracing::debug!(%outcome, "Flow block cleared");
    } else {
        flow.set(outcome, block);
        tracing::debug!(%outcome, block, "Flow block set");
    }

    let code = match outcome {
        Outcome::NoScriptFailure => StatusCode::IGNORE_RETURN_CODE,
        _ => StatusCode::NO_SCRIPT_FAILURE,
    };
    Some(RecordStatus::new(code, format!("{} = '{}'", outcome.config_item(), block)))
}
