//! Typed projection of one spool row.
//!
//! The row is the materialized current state of a spool; the audit log is
//! the authoritative history. `SpoolRecord` is rebuilt from column data on
//! every request and never cached across requests.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::workflow::operation::Operation;

use super::client::RowData;
use super::columns;
use super::dates;

/// Assignee and timestamps for a single operation on a spool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSlot {
    pub assignee: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolRecord {
    pub spool_id: String,
    pub drawing_no: Option<String>,
    pub released: Option<DateTime<Utc>>,
    pub occupied_by: Option<String>,
    pub occupied_at: Option<DateTime<Utc>>,
    pub revision: Option<String>,
    pub status: String,
    pub fitup: OperationSlot,
    pub weld: OperationSlot,
    pub qc: OperationSlot,
    pub rework: OperationSlot,
}

impl SpoolRecord {
    pub fn from_row(spool_id: &str, row: &RowData) -> Self {
        Self {
            spool_id: spool_id.to_string(),
            drawing_no: text(row, columns::DRAWING_NO),
            released: date(spool_id, row, columns::RELEASED),
            occupied_by: text(row, columns::OCCUPIED_BY),
            occupied_at: date(spool_id, row, columns::OCCUPIED_AT),
            revision: text(row, columns::REVISION),
            status: text(row, columns::STATUS).unwrap_or_default(),
            fitup: slot(spool_id, row, Operation::Fitup),
            weld: slot(spool_id, row, Operation::Weld),
            qc: slot(spool_id, row, Operation::Inspect),
            rework: slot(spool_id, row, Operation::Rework),
        }
    }

    pub fn slot(&self, operation: Operation) -> &OperationSlot {
        match operation {
            Operation::Fitup => &self.fitup,
            Operation::Weld => &self.weld,
            Operation::Inspect => &self.qc,
            Operation::Rework => &self.rework,
        }
    }

    /// True when some operation is attributable to `worker` and still open.
    /// Used by hydration to decide whether an occupant is accounted for.
    pub fn occupant_attributed(&self, worker: &str) -> bool {
        Operation::ALL.iter().any(|op| {
            let slot = self.slot(*op);
            slot.completed.is_none() && slot.assignee.as_deref() == Some(worker)
        })
    }
}

fn text(row: &RowData, column: &str) -> Option<String> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn date(spool_id: &str, row: &RowData, column: &str) -> Option<DateTime<Utc>> {
    let raw = text(row, column)?;
    let parsed = dates::parse_flexible(&raw);
    if parsed.is_none() {
        // Historical rows occasionally carry free-text in date cells. Treat
        // as blank rather than failing the whole request.
        warn!(spool_id, column, value = %raw, "unparseable date cell");
    }
    parsed
}

fn slot(spool_id: &str, row: &RowData, operation: Operation) -> OperationSlot {
    OperationSlot {
        assignee: text(row, operation.assignee_column()),
        started: date(spool_id, row, operation.started_column()),
        completed: date(spool_id, row, operation.completed_column()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entries: &[(&str, &str)]) -> RowData {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_a_fully_populated_row() {
        let record = SpoolRecord::from_row(
            "SP-204",
            &row(&[
                (columns::DRAWING_NO, "ISO-88-204"),
                (columns::RELEASED, "2024-01-10"),
                (columns::OCCUPIED_BY, "o.diaz"),
                (columns::OCCUPIED_AT, "2024-01-12 08:15:00"),
                (columns::FITUP_BY, "o.diaz"),
                (columns::FITUP_STARTED, "2024-01-12 08:15:00"),
                (columns::STATUS, "fit-up in progress: o.diaz"),
            ]),
        );

        assert_eq!(record.drawing_no.as_deref(), Some("ISO-88-204"));
        assert_eq!(record.occupied_by.as_deref(), Some("o.diaz"));
        assert_eq!(record.fitup.assignee.as_deref(), Some("o.diaz"));
        assert!(record.fitup.started.is_some());
        assert!(record.fitup.completed.is_none());
    }

    #[test]
    fn blank_and_whitespace_cells_are_none() {
        let record = SpoolRecord::from_row(
            "SP-1",
            &row(&[(columns::OCCUPIED_BY, "  "), (columns::FITUP_BY, "")]),
        );
        assert!(record.occupied_by.is_none());
        assert!(record.fitup.assignee.is_none());
    }

    #[test]
    fn garbage_date_is_treated_as_blank() {
        let record = SpoolRecord::from_row("SP-1", &row(&[(columns::RELEASED, "asap")]));
        assert!(record.released.is_none());
    }

    #[test]
    fn occupant_attribution_checks_open_slots_only() {
        let record = SpoolRecord::from_row(
            "SP-1",
            &row(&[
                (columns::FITUP_BY, "o.diaz"),
                (columns::FITUP_DONE, "2024-01-12 10:00:00"),
                (columns::WELD_BY, "k.osei"),
            ]),
        );
        assert!(record.occupant_attributed("k.osei"));
        // Fit-up is complete, so o.diaz is no longer attributed anywhere.
        assert!(!record.occupant_attributed("o.diaz"));
    }
}
