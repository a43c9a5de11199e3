use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Submitted,
    Approved,
    Rejected,
    SendBack,
    Resubmitted,
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::SendBack => "send_back",
            Self::Resubmitted => "resubmitted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "send_back" => Some(Self::SendBack),
            "resubmitted" => Some(Self::Resubmitted),
            _ => None,
        }
    }
}

/// One immutable entry in the decision ledger.
///
/// `step_key`/`step_label`/`role` capture the step that was active when the
/// action was taken; they are never rewritten if the registry's role
/// mapping changes later. `seq` is assigned by the store on insert and
/// breaks ties between records sharing a timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub request_id: RequestId,
    pub seq: i64,
    pub step_key: String,
    pub step_label: String,
    pub role: String,
    pub result: ActionResult,
    pub comment: Option<String>,
    pub actor: String,
    pub attachment_refs: Vec<String>,
    pub acted_at: DateTime<Utc>,
}
