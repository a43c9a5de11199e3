use sqlx::{QueryBuilder, Row, Sqlite};

use closeflow_core::domain::action::ActionRecord;
use closeflow_core::domain::request::{ClosingRequest, RequestId, RequestStatus};
use closeflow_core::workflow::store::{RequestFilter, RequestStore};
use closeflow_core::StoreError;

use super::{db_err, decode_datetime, decode_decimal, decode_err};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, contract_no, customer_name, contract_value, settlement_amount,
        remark, attachment_ref, status, current_step, version, created_by, created_at, updated_at";

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ClosingRequest, StoreError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let contract_no: String = row.try_get("contract_no").map_err(decode_err)?;
    let customer_name: Option<String> = row.try_get("customer_name").map_err(decode_err)?;
    let contract_value: Option<String> = row.try_get("contract_value").map_err(decode_err)?;
    let settlement_amount: Option<String> = row.try_get("settlement_amount").map_err(decode_err)?;
    let remark: Option<String> = row.try_get("remark").map_err(decode_err)?;
    let attachment_ref: Option<String> = row.try_get("attachment_ref").map_err(decode_err)?;
    let status_str: String = row.try_get("status").map_err(decode_err)?;
    let current_step: Option<String> = row.try_get("current_step").map_err(decode_err)?;
    let version: i64 = row.try_get("version").map_err(decode_err)?;
    let created_by: String = row.try_get("created_by").map_err(decode_err)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_err)?;

    let status = RequestStatus::parse(&status_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown request status `{status_str}`")))?;

    Ok(ClosingRequest {
        id: RequestId(id),
        contract_no,
        customer_name,
        contract_value: decode_decimal(contract_value, "contract_value")?,
        settlement_amount: decode_decimal(settlement_amount, "settlement_amount")?,
        remark,
        attachment_ref,
        status,
        current_step,
        version,
        created_by,
        created_at: decode_datetime(&created_at_str, "created_at")?,
        updated_at: decode_datetime(&updated_at_str, "updated_at")?,
    })
}

pub(crate) async fn insert_action(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    record: &ActionRecord,
) -> Result<(), StoreError> {
    let attachment_refs = serde_json::to_string(&record.attachment_refs)
        .map_err(|error| StoreError::Decode(error.to_string()))?;

    sqlx::query(
        "INSERT INTO approval_action (id, request_id, step_key, step_label, role, result,
                                      comment, actor, attachment_refs, acted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.request_id.0)
    .bind(&record.step_key)
    .bind(&record.step_label)
    .bind(&record.role)
    .bind(record.result.as_str())
    .bind(&record.comment)
    .bind(&record.actor)
    .bind(&attachment_refs)
    .bind(record.acted_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    Ok(())
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn create(
        &self,
        request: &ClosingRequest,
        submitted: &ActionRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO closing_request (id, contract_no, customer_name, contract_value,
                                          settlement_amount, remark, attachment_ref, status,
                                          current_step, version, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.contract_no)
        .bind(&request.customer_name)
        .bind(request.contract_value.map(|value| value.to_string()))
        .bind(request.settlement_amount.map(|value| value.to_string()))
        .bind(&request.remark)
        .bind(&request.attachment_ref)
        .bind(request.status.as_str())
        .bind(&request.current_step)
        .bind(request.version)
        .bind(&request.created_by)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        insert_action(&mut tx, submitted).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ClosingRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM closing_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn commit_transition(
        &self,
        request: &ClosingRequest,
        expected_version: i64,
        record: Option<&ActionRecord>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Compare-and-swap on the version column: the update only lands if
        // the row still matches the snapshot the transition was computed
        // from.
        let result = sqlx::query(
            "UPDATE closing_request
             SET contract_no = ?, customer_name = ?, contract_value = ?, settlement_amount = ?,
                 remark = ?, attachment_ref = ?, status = ?, current_step = ?, version = ?,
                 updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&request.contract_no)
        .bind(&request.customer_name)
        .bind(request.contract_value.map(|value| value.to_string()))
        .bind(request.settlement_amount.map(|value| value.to_string()))
        .bind(&request.remark)
        .bind(&request.attachment_ref)
        .bind(request.status.as_str())
        .bind(&request.current_step)
        .bind(request.version)
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionMismatch);
        }

        if let Some(record) = record {
            insert_action(&mut tx, record).await?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ClosingRequest>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM closing_request WHERE 1 = 1"
        ));
        if let Some(current_step) = &filter.current_step {
            builder.push(" AND current_step = ").push_bind(current_step);
        }
        if let Some(created_by) = &filter.created_by {
            builder.push(" AND created_by = ").push_bind(created_by);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder.build().fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_request).collect()
    }
}
