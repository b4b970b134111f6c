// Bounded-cycle rework policy.
//
// The cycle count is not stored on the row; it is derived from the audit
// history so the projection can never drift from the record of what
// actually happened. Rejections accumulate until an acceptance or a manual
// override resets them; at the limit the spool is blocked and the normal
// claim path refuses it.

use crate::audit::{AuditAction, AuditEvent};

pub const DEFAULT_CYCLE_LIMIT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReworkStanding {
    /// Rejections since the last acceptance or override.
    pub cycles: u32,
    pub limit: u32,
}

impl ReworkStanding {
    pub fn blocked(&self) -> bool {
        self.cycles >= self.limit
    }

    /// The spool is inside an open rework cycle (rejected, not yet
    /// re-accepted, not yet blocked).
    pub fn in_rework(&self) -> bool {
        self.cycles > 0 && !self.blocked()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReworkPolicy {
    limit: u32,
}

impl Default for ReworkPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CYCLE_LIMIT,
        }
    }
}

impl ReworkPolicy {
    pub fn new(limit: u32) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Fold the ordered event history into the current standing.
    pub fn standing(&self, events: &[AuditEvent]) -> ReworkStanding {
        let mut cycles = 0u32;
        for event in events {
            match event.action {
                AuditAction::Rejected => cycles += 1,
                AuditAction::Accepted | AuditAction::BlockOverridden => cycles = 0,
                _ => {}
            }
        }
        ReworkStanding {
            cycles,
            limit: self.limit,
        }
    }
}
