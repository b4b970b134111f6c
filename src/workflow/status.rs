//! Combined-status builder.
//!
//! One human-readable string summarizing the occupation fields and every
//! operation machine state. Recomputed after every successful transition
//! and persisted onto the row, so read-only consumers (dashboards, the
//! shop-floor screens) never re-derive it. Pure function of its inputs; no
//! clock, no I/O.

use crate::store::record::SpoolRecord;

use super::hydration::hydrate;
use super::operation::Operation;
use super::rework::ReworkStanding;
use super::state_machine::OperationState;

pub fn combined_status(record: &SpoolRecord, standing: &ReworkStanding) -> String {
    if standing.blocked() {
        return format!(
            "blocked: rework limit reached ({} rejections)",
            standing.cycles
        );
    }

    if standing.cycles > 0 {
        return rework_cycle_status(record, standing);
    }

    if record.slot(Operation::Inspect).completed.is_some() {
        return "complete".to_string();
    }

    for operation in [Operation::Fitup, Operation::Weld, Operation::Inspect] {
        match hydrate(operation, record) {
            OperationState::Completed => continue,
            OperationState::InProgress => {
                return format!("{} in progress: {}", operation, worker_on(record, operation));
            }
            OperationState::Paused => {
                return format!("{} paused: {}", operation, assignee_of(record, operation));
            }
            OperationState::Pending => {
                if operation == Operation::Fitup && record.released.is_none() {
                    return "awaiting release".to_string();
                }
                return format!("awaiting {operation}");
            }
        }
    }

    "complete".to_string()
}

fn rework_cycle_status(record: &SpoolRecord, standing: &ReworkStanding) -> String {
    let cycle = format!("cycle {} of {}", standing.cycles, standing.limit);

    if record.slot(Operation::Rework).completed.is_some() {
        // Rework landed; the spool is back in front of QC.
        return match hydrate(Operation::Inspect, record) {
            OperationState::InProgress => format!(
                "re-inspection in progress: {}",
                worker_on(record, Operation::Inspect)
            ),
            OperationState::Paused => format!(
                "re-inspection paused: {}",
                assignee_of(record, Operation::Inspect)
            ),
            _ => format!("awaiting re-inspection ({cycle})"),
        };
    }

    match hydrate(Operation::Rework, record) {
        OperationState::InProgress => {
            format!("rework in progress: {}", worker_on(record, Operation::Rework))
        }
        OperationState::Paused => {
            format!("rework paused: {}", assignee_of(record, Operation::Rework))
        }
        _ => format!("rejected: awaiting rework ({cycle})"),
    }
}

fn worker_on(record: &SpoolRecord, operation: Operation) -> String {
    record
        .occupied_by
        .clone()
        .or_else(|| record.slot(operation).assignee.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

fn assignee_of(record: &SpoolRecord, operation: Operation) -> String {
    record
        .slot(operation)
        .assignee
        .clone()
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::RowData;
    use crate::store::columns;
    use proptest::prelude::*;

    fn record(entries: &[(&str, &str)]) -> SpoolRecord {
        let row: RowData = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SpoolRecord::from_row("SP-1", &row)
    }

    fn clean(cycles: u32) -> ReworkStanding {
        ReworkStanding { cycles, limit: 3 }
    }

    #[test]
    fn walks_the_operation_sequence() {
        assert_eq!(combined_status(&record(&[]), &clean(0)), "awaiting release");
        assert_eq!(
            combined_status(&record(&[(columns::RELEASED, "2024-01-10")]), &clean(0)),
            "awaiting fit-up"
        );

        let welding = record(&[
            (columns::RELEASED, "2024-01-10"),
            (columns::FITUP_BY, "o.diaz"),
            (columns::FITUP_DONE, "2024-01-12 10:00:00"),
            (columns::OCCUPIED_BY, "k.osei"),
            (columns::WELD_BY, "k.osei"),
        ]);
        assert_eq!(combined_status(&welding, &clean(0)), "weld in progress: k.osei");
    }

    #[test]
    fn paused_shows_the_resumable_assignee() {
        let paused = record(&[
            (columns::RELEASED, "2024-01-10"),
            (columns::FITUP_DONE, "2024-01-12 10:00:00"),
            (columns::WELD_BY, "k.osei"),
        ]);
        assert_eq!(combined_status(&paused, &clean(0)), "weld paused: k.osei");
    }

    #[test]
    fn accepted_inspection_is_complete() {
        let done = record(&[
            (columns::FITUP_DONE, "2024-01-12 10:00:00"),
            (columns::WELD_DONE, "2024-01-14 10:00:00"),
            (columns::QC_DONE, "2024-01-15 10:00:00"),
        ]);
        assert_eq!(combined_status(&done, &clean(0)), "complete");
    }

    #[test]
    fn rejection_states_are_distinct() {
        let base = [
            (columns::FITUP_DONE, "2024-01-12 10:00:00"),
            (columns::WELD_DONE, "2024-01-14 10:00:00"),
        ];

        assert_eq!(
            combined_status(&record(&base), &clean(1)),
            "rejected: awaiting rework (cycle 1 of 3)"
        );

        let mut in_rework = base.to_vec();
        in_rework.push((columns::OCCUPIED_BY, "k.osei"));
        in_rework.push((columns::REWORK_BY, "k.osei"));
        assert_eq!(
            combined_status(&record(&in_rework), &clean(1)),
            "rework in progress: k.osei"
        );

        let mut reworked = base.to_vec();
        reworked.push((columns::REWORK_BY, "k.osei"));
        reworked.push((columns::REWORK_DONE, "2024-01-16 10:00:00"));
        assert_eq!(
            combined_status(&record(&reworked), &clean(1)),
            "awaiting re-inspection (cycle 1 of 3)"
        );
    }

    #[test]
    fn blocked_overrides_everything() {
        let blocked = ReworkStanding { cycles: 3, limit: 3 };
        assert_eq!(
            combined_status(&record(&[]), &blocked),
            "blocked: rework limit reached (3 rejections)"
        );
    }

    proptest! {
        // The builder is a pure projection: same fields in, same string out.
        #[test]
        fn status_is_deterministic(
            occupant in proptest::option::of("[a-z]\\.[a-z]{2,8}"),
            weld_by in proptest::option::of("[a-z]\\.[a-z]{2,8}"),
            released in any::<bool>(),
            cycles in 0u32..5,
        ) {
            let mut entries: Vec<(&str, String)> = Vec::new();
            if let Some(o) = &occupant {
                entries.push((columns::OCCUPIED_BY, o.clone()));
            }
            if let Some(w) = &weld_by {
                entries.push((columns::WELD_BY, w.clone()));
            }
            if released {
                entries.push((columns::RELEASED, "2024-01-10".to_string()));
            }
            let row: RowData = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            let record = SpoolRecord::from_row("SP-1", &row);
            let standing = ReworkStanding { cycles, limit: 3 };

            let first = combined_status(&record, &standing);
            let second = combined_status(&record, &standing);
            prop_assert_eq!(first, second);
        }
    }
}
