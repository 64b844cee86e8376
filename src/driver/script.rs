//! Script loading: one record per meaningful line

use std::path::Path;

use crate::common::{Error, Result};
use crate::record::TestRecord;

/// Record type that labels a block
pub const BLOCK_RECORD: &str = "B";
/// Record type the driver skips
pub const SKIP_RECORD: &str = "S";

/// A parsed test table
#[derive(Debug, Clone)]
pub struct Script {
    name: String,
    records: Vec<TestRecord>,
}

impl Script {
    /// Parse script text
    ///
    /// Blank lines and lines starting with `'` or `;` are comments and do
    /// not become records. Line numbers on records are 1-based positions in
    /// `content`.
    pub fn parse(name: impl Into<String>, content: &str, separator: &str) -> Self {
        let name = name.into();
        let records = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !is_comment(line))
            .map(|(i, line)| TestRecord::new(line.trim_end(), separator).at(name.clone(), i + 1))
            .collect();
        Self { name, records }
    }

    /// Read and parse a script file
    pub fn load(path: impl AsRef<Path>, separator: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::ScriptRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::parse(name, &content, separator))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Index of the `B` record labelling `block`, matched case-insensitively
    pub fn find_block(&self, block: &str) -> Option<usize> {
        let block = block.trim();
        self.records.iter().position(|record| {
            record.record_type() == BLOCK_RECORD
                && record
                    .field(1)
                    .is_some_and(|id| id.eq_ignore_ascii_case(block))
        })
    }
}

fn is_comment(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('\'') || line.starts_with(';')
}
