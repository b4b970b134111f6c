//! Column-name constants for the spool tracking sheet.
//!
//! The durable store is addressed by column name, not position. These
//! constants MUST match the header row of the production sheet; if the sheet
//! layout changes, update them here and nowhere else.

pub const SPOOL_ID: &str = "spool_id";
pub const DRAWING_NO: &str = "drawing_no";

/// Date the spool package was released to the shop floor. Fit-up cannot be
/// claimed before this is set.
pub const RELEASED: &str = "released";

/// Worker currently holding the live claim. Cleared on pause and complete.
pub const OCCUPIED_BY: &str = "occupied_by";
pub const OCCUPIED_AT: &str = "occupied_at";

/// Opaque version token, regenerated on every write.
pub const REVISION: &str = "revision";

/// Materialized combined status string. Read-only consumers display this
/// directly instead of re-deriving it from the operation columns.
pub const STATUS: &str = "status";

pub const FITUP_BY: &str = "fitup_by";
pub const FITUP_STARTED: &str = "fitup_started";
pub const FITUP_DONE: &str = "fitup_done";

pub const WELD_BY: &str = "weld_by";
pub const WELD_STARTED: &str = "weld_started";
pub const WELD_DONE: &str = "weld_done";

pub const QC_BY: &str = "qc_by";
pub const QC_STARTED: &str = "qc_started";
pub const QC_DONE: &str = "qc_done";

pub const REWORK_BY: &str = "rework_by";
pub const REWORK_STARTED: &str = "rework_started";
pub const REWORK_DONE: &str = "rework_done";

/// Columns that hold timestamps. Values written to these are normalized to
/// the canonical wire format; values read from them are parsed leniently
/// (see [`crate::store::dates`]).
pub const DATE_COLUMNS: &[&str] = &[
    RELEASED,
    OCCUPIED_AT,
    FITUP_STARTED,
    FITUP_DONE,
    WELD_STARTED,
    WELD_DONE,
    QC_STARTED,
    QC_DONE,
    REWORK_STARTED,
    REWORK_DONE,
];

pub fn is_date_column(name: &str) -> bool {
    DATE_COLUMNS.contains(&name)
}
