//! Conflict resolution policy when a resource is already held (spec.md §4.4).
use std::time::Duration;

/// Inputs to the conflict resolution decision table.
#[derive(Clone, Copy, Debug)]
pub struct ConflictContext {
    /// Both the requester and the current owner declare capabilities that typically edit this
    /// resource.
    pub capability_overlap: bool,
    /// The resource is tagged critical.
    pub resource_is_critical: bool,
    /// The requesting task carries an `urgent`/`critical`/`security` priority tag.
    pub request_is_high_priority: bool,
    /// The current owner still has a live Worker record.
    pub owner_registered: bool,
    pub wait_timeout: Duration,
}

/// The chosen resolution strategy (spec.md §4.4 conflict resolution table).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// Issue a directed `coord_request`; auto-accept if the target has spare capacity.
    Coordinate,
    /// Force-lock, recording `reason` to the audit trail.
    Override { reason: &'static str },
    /// Wait up to the given timeout; if it elapses, fall back to `Queue`.
    Wait { timeout: Duration },
}

/// Decide how to resolve a claim conflict, applying the table's rows in priority order.
pub fn resolve(ctx: &ConflictContext) -> Resolution {
    if ctx.capability_overlap {
        return Resolution::Coordinate;
    }
    if ctx.resource_is_critical && ctx.request_is_high_priority {
        return Resolution::Override {
            reason: "critical resource requested by high-priority task",
        };
    }
    if !ctx.owner_registered {
        return Resolution::Override {
            reason: "current owner is no longer registered",
        };
    }
    Resolution::Wait {
        timeout: ctx.wait_timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConflictContext {
        ConflictContext {
            capability_overlap: false,
            resource_is_critical: false,
            request_is_high_priority: false,
            owner_registered: true,
            wait_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn overlap_takes_priority() {
        let mut ctx = base();
        ctx.capability_overlap = true;
        ctx.resource_is_critical = true;
        ctx.request_is_high_priority = true;
        assert_eq!(resolve(&ctx), Resolution::Coordinate);
    }

    #[test]
    fn critical_and_urgent_overrides() {
        let mut ctx = base();
        ctx.resource_is_critical = true;
        ctx.request_is_high_priority = true;
        assert!(matches!(resolve(&ctx), Resolution::Override { .. }));
    }

    #[test]
    fn missing_owner_overrides() {
        let mut ctx = base();
        ctx.owner_registered = false;
        assert!(matches!(resolve(&ctx), Resolution::Override { .. }));
    }

    #[test]
    fn otherwise_waits() {
        let ctx = base();
        assert!(matches!(resolve(&ctx), Resolution::Wait { .. }));
    }
}
