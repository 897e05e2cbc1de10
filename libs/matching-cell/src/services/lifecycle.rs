use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MatchingError;
use crate::models::{MatchRequest, MatchStatus};

/// Transition rules for match requests.
pub struct MatchLifecycle;

impl MatchLifecycle {
    /// All statuses reachable in one step from `current`.
    pub fn valid_transitions(current: MatchStatus) -> &'static [MatchStatus] {
        match current {
            MatchStatus::Pending => &[
                MatchStatus::Accepted,
                MatchStatus::Cancelled,
                MatchStatus::Rejected,
            ],
            MatchStatus::Accepted => &[MatchStatus::Cancelled],
            // Terminal states
            MatchStatus::Cancelled | MatchStatus::Rejected => &[],
        }
    }

    pub fn validate_transition(
        request_id: Uuid,
        current: MatchStatus,
        next: MatchStatus,
    ) -> Result<(), MatchingError> {
        debug!("Validating transition of {} from {} to {}", request_id, current, next);

        if !Self::valid_transitions(current).contains(&next) {
            warn!("Invalid transition attempted on {}: {} -> {}", request_id, current, next);
            return Err(MatchingError::InvalidState {
                request_id,
                current,
                attempted: next,
            });
        }

        Ok(())
    }

    /// Accept and reject belong to the targeted doctor alone.
    pub fn authorize_doctor(request: &MatchRequest, acting_doctor_id: Uuid) -> Result<(), MatchingError> {
        if request.doctor_id != acting_doctor_id {
            warn!("User {} is not the doctor of request {}", acting_doctor_id, request.id);
            return Err(MatchingError::Authorization(
                "Only the requested doctor can answer this request".to_string(),
            ));
        }
        Ok(())
    }

    /// Either side of the relationship may cancel it.
    pub fn authorize_participant(request: &MatchRequest, acting_user_id: Uuid) -> Result<(), MatchingError> {
        if acting_user_id != request.patient_id && acting_user_id != request.doctor_id {
            warn!("User {} is not a participant of request {}", acting_user_id, request.id);
            return Err(MatchingError::Authorization(
                "Only the patient or the doctor of this request can cancel it".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ALL: [MatchStatus; 4] = [
        MatchStatus::Pending,
        MatchStatus::Accepted,
        MatchStatus::Cancelled,
        MatchStatus::Rejected,
    ];

    #[test]
    fn test_transition_table() {
        let allowed = [
            (MatchStatus::Pending, MatchStatus::Accepted),
            (MatchStatus::Pending, MatchStatus::Cancelled),
            (MatchStatus::Pending, MatchStatus::Rejected),
            (MatchStatus::Accepted, MatchStatus::Cancelled),
        ];

        for from in ALL {
            for to in ALL {
                let result = MatchLifecycle::validate_transition(Uuid::nil(), from, to);
                if allowed.contains(&(from, to)) {
                    assert!(result.is_ok(), "{} -> {} should be allowed", from, to);
                } else {
                    assert_matches!(result, Err(MatchingError::InvalidState { .. }), "{} -> {}", from, to);
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        assert!(MatchLifecycle::valid_transitions(MatchStatus::Cancelled).is_empty());
        assert!(MatchLifecycle::valid_transitions(MatchStatus::Rejected).is_empty());
    }
}
