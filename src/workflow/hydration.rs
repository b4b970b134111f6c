//! Row-to-state hydration.
//!
//! Machines are never persisted; the current state of each operation is
//! re-derived from the row on every request. Every heuristic that maps an
//! inconsistent field combination onto a valid state lives in this one
//! function, with a named case, so recovery behavior cannot regress
//! silently from an edit elsewhere.

use crate::store::record::SpoolRecord;

use super::operation::Operation;
use super::state_machine::OperationState;

/// Derive the current state of `operation` from the row.
///
/// Cases, in order:
///
/// 1. `completed`: completion timestamp present.
/// 2. `occupied`: assignee present and the row's occupant is that worker.
/// 3. `paused`: assignee present, no occupant (or the occupant is working
///    a different operation).
/// 4. `recovered-claim`: occupant present, assignee absent, and no other
///    open operation accounts for the occupant. A crash between the
///    occupant write and the assignee write during a claim leaves the row
///    in exactly this shape; mapping it to `InProgress` lets a later pause
///    or complete run and repair the missing assignee, instead of wedging
///    the spool behind an invalid-transition error. Deliberate recovery
///    path; do not "fix" this into `Pending`.
/// 5. `pending`: none of the above.
pub fn hydrate(operation: Operation, record: &SpoolRecord) -> OperationState {
    let slot = record.slot(operation);

    if slot.completed.is_some() {
        return OperationState::Completed;
    }

    if let Some(assignee) = &slot.assignee {
        return if record.occupied_by.as_deref() == Some(assignee.as_str()) {
            OperationState::InProgress
        } else {
            OperationState::Paused
        };
    }

    if let Some(occupant) = &record.occupied_by {
        if !record.occupant_attributed(occupant) {
            return OperationState::InProgress;
        }
    }

    OperationState::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::RowData;
    use crate::store::columns;

    fn record(entries: &[(&str, &str)]) -> SpoolRecord {
        let row: RowData = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SpoolRecord::from_row("SP-1", &row)
    }

    #[test]
    fn completion_date_wins() {
        let record = record(&[
            (columns::WELD_BY, "o.diaz"),
            (columns::WELD_DONE, "2024-03-07 16:00:00"),
        ]);
        assert_eq!(hydrate(Operation::Weld, &record), OperationState::Completed);
    }

    #[test]
    fn assignee_with_matching_occupant_is_in_progress() {
        let record = record(&[
            (columns::OCCUPIED_BY, "o.diaz"),
            (columns::WELD_BY, "o.diaz"),
        ]);
        assert_eq!(
            hydrate(Operation::Weld, &record),
            OperationState::InProgress
        );
    }

    #[test]
    fn assignee_without_occupant_is_paused() {
        let record = record(&[(columns::WELD_BY, "o.diaz")]);
        assert_eq!(hydrate(Operation::Weld, &record), OperationState::Paused);
    }

    #[test]
    fn occupant_on_another_operation_leaves_this_one_paused() {
        let record = record(&[
            (columns::OCCUPIED_BY, "k.osei"),
            (columns::WELD_BY, "o.diaz"),
            (columns::REWORK_BY, "k.osei"),
        ]);
        assert_eq!(hydrate(Operation::Weld, &record), OperationState::Paused);
    }

    #[test]
    fn recovered_claim_hydrates_to_in_progress_not_pending() {
        // Crash between the occupant write and the assignee write.
        let record = record(&[(columns::OCCUPIED_BY, "o.diaz")]);
        assert_eq!(
            hydrate(Operation::Weld, &record),
            OperationState::InProgress
        );
    }

    #[test]
    fn occupant_attributed_elsewhere_does_not_trigger_recovery() {
        let record = record(&[
            (columns::OCCUPIED_BY, "k.osei"),
            (columns::REWORK_BY, "k.osei"),
        ]);
        assert_eq!(hydrate(Operation::Weld, &record), OperationState::Pending);
    }

    #[test]
    fn untouched_row_is_pending() {
        let record = record(&[]);
        assert_eq!(hydrate(Operation::Fitup, &record), OperationState::Pending);
    }
}
