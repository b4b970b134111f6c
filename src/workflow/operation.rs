use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::columns;

/// The fixed set of shop operations a spool moves through. The transition
/// graphs are small and hard-coded; this is not a workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Fitup,
    Weld,
    Inspect,
    Rework,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Fitup,
        Operation::Weld,
        Operation::Inspect,
        Operation::Rework,
    ];

    pub fn assignee_column(&self) -> &'static str {
        match self {
            Operation::Fitup => columns::FITUP_BY,
            Operation::Weld => columns::WELD_BY,
            Operation::Inspect => columns::QC_BY,
            Operation::Rework => columns::REWORK_BY,
        }
    }

    pub fn started_column(&self) -> &'static str {
        match self {
            Operation::Fitup => columns::FITUP_STARTED,
            Operation::Weld => columns::WELD_STARTED,
            Operation::Inspect => columns::QC_STARTED,
            Operation::Rework => columns::REWORK_STARTED,
        }
    }

    pub fn completed_column(&self) -> &'static str {
        match self {
            Operation::Fitup => columns::FITUP_DONE,
            Operation::Weld => columns::WELD_DONE,
            Operation::Inspect => columns::QC_DONE,
            Operation::Rework => columns::REWORK_DONE,
        }
    }

    /// The operation that must be complete before this one can start.
    /// Rework is gated on rejection standing instead, and fit-up on the
    /// release date; neither has an operation prerequisite.
    pub fn prerequisite(&self) -> Option<Operation> {
        match self {
            Operation::Fitup => None,
            Operation::Weld => Some(Operation::Fitup),
            Operation::Inspect => Some(Operation::Weld),
            Operation::Rework => None,
        }
    }

    /// Human-readable name used in statuses and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Fitup => "fit-up",
            Operation::Weld => "weld",
            Operation::Inspect => "inspection",
            Operation::Rework => "rework",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fitup" | "fit-up" => Ok(Operation::Fitup),
            "weld" => Ok(Operation::Weld),
            "inspect" | "inspection" | "qc" => Ok(Operation::Inspect),
            "rework" => Ok(Operation::Rework),
            other => Err(format!("unknown operation '{other}'")),
        }
    }
}
