use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

/// A free-form remark on a request. Comments are append-only and never
/// affect workflow state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub request_id: RequestId,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
