use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    UnderReview,
    Approved,
    Rejected,
    SentBack,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::SentBack => "sent_back",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "sent_back" => Some(Self::SentBack),
            _ => None,
        }
    }
}

/// A contract-closing request walking through the approval sequence.
///
/// `version` is the optimistic concurrency column: every committed state
/// transition increments it, and stores refuse writes whose expected
/// version no longer matches the row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClosingRequest {
    pub id: RequestId,
    pub contract_no: String,
    pub customer_name: Option<String>,
    pub contract_value: Option<Decimal>,
    pub settlement_amount: Option<Decimal>,
    pub remark: Option<String>,
    pub attachment_ref: Option<String>,
    pub status: RequestStatus,
    pub current_step: Option<String>,
    pub version: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClosingRequest {
    /// Terminal requests accept no further actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ClosingRequest, RequestId, RequestStatus};

    fn request(status: RequestStatus) -> ClosingRequest {
        let now = Utc::now();
        ClosingRequest {
            id: RequestId("CR-1".to_string()),
            contract_no: "CT-2026-0001".to_string(),
            customer_name: None,
            contract_value: None,
            settlement_amount: None,
            remark: None,
            attachment_ref: None,
            status,
            current_step: None,
            version: 1,
            created_by: "alex@example.com".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn approved_and_rejected_are_terminal() {
        assert!(request(RequestStatus::Approved).is_terminal());
        assert!(request(RequestStatus::Rejected).is_terminal());
        assert!(!request(RequestStatus::UnderReview).is_terminal());
        assert!(!request(RequestStatus::SentBack).is_terminal());
    }

    #[test]
    fn status_round_trips_through_column_representation() {
        for status in [
            RequestStatus::UnderReview,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::SentBack,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("archived"), None);
    }
}
