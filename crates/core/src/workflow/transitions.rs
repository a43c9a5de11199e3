use serde::{Deserialize, Serialize};

use crate::domain::action::ActionResult;
use crate::domain::request::RequestStatus;
use crate::workflow::steps::StepRegistry;

/// A reviewer decision on the currently active step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    SendBack,
}

impl Decision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "send_back" => Some(Self::SendBack),
            _ => None,
        }
    }

    /// The ledger result recorded for this decision.
    pub fn action_result(&self) -> ActionResult {
        match self {
            Self::Approve => ActionResult::Approved,
            Self::Reject => ActionResult::Rejected,
            Self::SendBack => ActionResult::SendBack,
        }
    }
}

/// The `(status, current_step)` pair a decision moves a request into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NextState {
    pub status: RequestStatus,
    pub current_step: Option<String>,
}

/// Pure transition computation over a validated current step.
///
/// - approve advances to the following registry step, or finalizes when the
///   current step is the last one;
/// - reject closes the request immediately at any position;
/// - send_back returns control to the submitter at the first step.
///
/// Terminal outcomes carry a null step.
pub fn next_state(registry: &StepRegistry, current_step: &str, decision: Decision) -> NextState {
    match decision {
        Decision::Approve => match registry.next_step_key(Some(current_step)) {
            Some(next) => NextState {
                status: RequestStatus::UnderReview,
                current_step: Some(next.to_string()),
            },
            None => NextState { status: RequestStatus::Approved, current_step: None },
        },
        Decision::Reject => NextState { status: RequestStatus::Rejected, current_step: None },
        Decision::SendBack => NextState {
            status: RequestStatus::SentBack,
            current_step: Some(registry.first_step_key().to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestStatus;
    use crate::workflow::steps::StepRegistry;

    use super::{next_state, Decision};

    #[test]
    fn approve_advances_through_the_sequence() {
        let registry = StepRegistry::standard();
        let next = next_state(&registry, "manager_review", Decision::Approve);
        assert_eq!(next.status, RequestStatus::UnderReview);
        assert_eq!(next.current_step.as_deref(), Some("finance_review"));
    }

    #[test]
    fn approving_the_last_step_finalizes() {
        let registry = StepRegistry::standard();
        let next = next_state(&registry, "executive_signoff", Decision::Approve);
        assert_eq!(next.status, RequestStatus::Approved);
        assert_eq!(next.current_step, None);
    }

    #[test]
    fn reject_terminates_at_any_position() {
        let registry = StepRegistry::standard();
        for step in ["manager_review", "finance_review", "executive_signoff"] {
            let next = next_state(&registry, step, Decision::Reject);
            assert_eq!(next.status, RequestStatus::Rejected);
            assert_eq!(next.current_step, None);
        }
    }

    #[test]
    fn send_back_resets_to_the_first_step() {
        let registry = StepRegistry::standard();
        let next = next_state(&registry, "compliance_review", Decision::SendBack);
        assert_eq!(next.status, RequestStatus::SentBack);
        assert_eq!(next.current_step.as_deref(), Some("submit"));
    }

    #[test]
    fn decision_parsing_accepts_only_wire_values() {
        assert_eq!(Decision::parse("approve"), Some(Decision::Approve));
        assert_eq!(Decision::parse("reject"), Some(Decision::Reject));
        assert_eq!(Decision::parse("send_back"), Some(Decision::SendBack));
        assert_eq!(Decision::parse("escalate"), None);
        assert_eq!(Decision::parse("Approve"), None);
    }
}
