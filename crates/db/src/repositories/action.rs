use sqlx::Row;

use closeflow_core::domain::action::{ActionRecord, ActionResult};
use closeflow_core::domain::request::RequestId;
use closeflow_core::workflow::store::ActionLedger;
use closeflow_core::StoreError;

use super::{db_err, decode_datetime, decode_err};
use crate::DbPool;

/// Read side of the decision ledger. Appends are issued by
/// [`SqlRequestStore`](super::SqlRequestStore) inside the request row's
/// transaction so a transition and its record land together.
pub struct SqlActionLedger {
    pool: DbPool,
}

impl SqlActionLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ActionRecord, StoreError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let request_id: String = row.try_get("request_id").map_err(decode_err)?;
    let seq: i64 = row.try_get("seq").map_err(decode_err)?;
    let step_key: String = row.try_get("step_key").map_err(decode_err)?;
    let step_label: String = row.try_get("step_label").map_err(decode_err)?;
    let role: String = row.try_get("role").map_err(decode_err)?;
    let result_str: String = row.try_get("result").map_err(decode_err)?;
    let comment: Option<String> = row.try_get("comment").map_err(decode_err)?;
    let actor: String = row.try_get("actor").map_err(decode_err)?;
    let attachment_refs_str: String = row.try_get("attachment_refs").map_err(decode_err)?;
    let acted_at_str: String = row.try_get("acted_at").map_err(decode_err)?;

    let result = ActionResult::parse(&result_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown action result `{result_str}`")))?;
    let attachment_refs: Vec<String> = serde_json::from_str(&attachment_refs_str)
        .map_err(|error| StoreError::Decode(format!("column `attachment_refs`: {error}")))?;

    Ok(ActionRecord {
        id,
        request_id: RequestId(request_id),
        seq,
        step_key,
        step_label,
        role,
        result,
        comment,
        actor,
        attachment_refs,
        acted_at: decode_datetime(&acted_at_str, "acted_at")?,
    })
}

#[async_trait::async_trait]
impl ActionLedger for SqlActionLedger {
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<ActionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT seq, id, request_id, step_key, step_label, role, result, comment, actor,
                    attachment_refs, acted_at
             FROM approval_action
             WHERE request_id = ?
             ORDER BY acted_at ASC, seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use closeflow_core::domain::action::{ActionRecord, ActionResult};
    use closeflow_core::domain::request::{ClosingRequest, RequestId, RequestStatus};
    use closeflow_core::workflow::store::{ActionLedger, RequestStore};

    use super::SqlActionLedger;
    use crate::repositories::SqlRequestStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn request(id: &str) -> ClosingRequest {
        let now = Utc::now();
        ClosingRequest {
            id: RequestId(id.to_string()),
            contract_no: format!("CT-{id}"),
            customer_name: None,
            contract_value: None,
            settlement_amount: None,
            remark: None,
            attachment_ref: None,
            status: RequestStatus::UnderReview,
            current_step: Some("manager_review".to_string()),
            version: 1,
            created_by: "alex@example.com".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn record(
        id: &str,
        request_id: &str,
        result: ActionResult,
        acted_at: DateTime<Utc>,
    ) -> ActionRecord {
        ActionRecord {
            id: id.to_string(),
            request_id: RequestId(request_id.to_string()),
            seq: 0,
            step_key: "manager_review".to_string(),
            step_label: "Manager Review".to_string(),
            role: "Manager".to_string(),
            result,
            comment: Some("reviewed".to_string()),
            actor: "morgan@example.com".to_string(),
            attachment_refs: vec!["att/1/evidence.pdf".to_string()],
            acted_at,
        }
    }

    #[tokio::test]
    async fn records_come_back_in_time_then_insertion_order() {
        let pool = setup().await;
        let requests = SqlRequestStore::new(pool.clone());
        let ledger = SqlActionLedger::new(pool);

        // Three records sharing one timestamp: insertion sequence must
        // break the tie deterministically.
        let shared_instant = Utc::now();
        requests
            .create(
                &request("CR-001"),
                &record("ACT-001", "CR-001", ActionResult::Submitted, shared_instant),
            )
            .await
            .expect("create");

        let mut advanced = request("CR-001");
        advanced.version = 2;
        requests
            .commit_transition(
                &advanced,
                1,
                Some(&record("ACT-002", "CR-001", ActionResult::Approved, shared_instant)),
            )
            .await
            .expect("second record");

        let mut again = advanced.clone();
        again.version = 3;
        requests
            .commit_transition(
                &again,
                2,
                Some(&record("ACT-003", "CR-001", ActionResult::SendBack, shared_instant)),
            )
            .await
            .expect("third record");

        let records =
            ledger.list_for_request(&RequestId("CR-001".to_string())).await.expect("list");
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["ACT-001", "ACT-002", "ACT-003"]
        );
        assert!(records.windows(2).all(|pair| pair[0].seq < pair[1].seq));
        assert_eq!(records[0].attachment_refs, vec!["att/1/evidence.pdf".to_string()]);
    }

    #[tokio::test]
    async fn ledger_is_scoped_per_request() {
        let pool = setup().await;
        let requests = SqlRequestStore::new(pool.clone());
        let ledger = SqlActionLedger::new(pool);

        let now = Utc::now();
        requests
            .create(&request("CR-010"), &record("ACT-010", "CR-010", ActionResult::Submitted, now))
            .await
            .expect("create first");
        requests
            .create(&request("CR-011"), &record("ACT-011", "CR-011", ActionResult::Submitted, now))
            .await
            .expect("create second");

        let records =
            ledger.list_for_request(&RequestId("CR-010".to_string())).await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "ACT-010");
    }
}
