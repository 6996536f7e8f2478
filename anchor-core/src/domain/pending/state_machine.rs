use crate::domain::PendingStatus;
use crate::foundation::AnchorError;

const VALID_TRANSITIONS: &[(PendingStatus, PendingStatus)] = &[
    (PendingStatus::Pending, PendingStatus::Confirmed),
    (PendingStatus::Pending, PendingStatus::Failed),
    // Operator-triggered recovery only; never taken automatically.
    (PendingStatus::Failed, PendingStatus::Pending),
];

/// Same-state re-entry is a no-op, not an error: queue retries may replay
/// a transition that already happened.
pub fn validate_transition(from: PendingStatus, to: PendingStatus) -> bool {
    from == to || VALID_TRANSITIONS.contains(&(from, to))
}

pub fn is_terminal(status: PendingStatus) -> bool {
    matches!(status, PendingStatus::Confirmed)
}

pub fn ensure_valid_transition(from: PendingStatus, to: PendingStatus) -> Result<(), AnchorError> {
    if validate_transition(from, to) {
        Ok(())
    } else {
        Err(AnchorError::InvalidStateTransition { from: from.to_string(), to: to.to_string() })
    }
}
