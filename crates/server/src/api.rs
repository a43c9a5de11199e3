//! JSON API for the closing-request approval workflow.
//!
//! Endpoints:
//! - `POST  /api/requests`                 — create and submit a closing request
//! - `GET   /api/requests`                 — list requests (role / created_by / status filters)
//! - `GET   /api/requests/{id}`            — request detail with ledger and comments
//! - `PATCH /api/requests/{id}`            — resubmit / partial edit
//! - `POST  /api/requests/{id}/actions`    — apply a reviewer decision
//! - `POST  /api/requests/{id}/comments`   — add a discussion comment
//! - `GET   /api/requests/{id}/comments`   — list discussion comments

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use closeflow_core::workflow::store::AttachmentPayload;
use closeflow_core::{
    ActionInput, ActionRecord, ClosingRequest, Comment, CommentInput, Decision, ListFilter,
    RequestDetail, RequestId, RequestStatus, RequestWithHistory, ResubmitInput, StepRegistry,
    SubmitInput, WorkflowEngine, WorkflowError,
};
use closeflow_db::{
    DbPool, FsAttachmentStore, SqlActionLedger, SqlCommentLog, SqlRequestStore,
};

pub type AppEngine =
    WorkflowEngine<SqlRequestStore, SqlActionLedger, SqlCommentLog, FsAttachmentStore>;

pub type ApiState = Arc<AppEngine>;

pub fn build_engine(db_pool: DbPool, attachment_dir: impl Into<std::path::PathBuf>) -> ApiState {
    Arc::new(WorkflowEngine::new(
        StepRegistry::standard(),
        SqlRequestStore::new(db_pool.clone()),
        SqlActionLedger::new(db_pool.clone()),
        SqlCommentLog::new(db_pool),
        FsAttachmentStore::new(attachment_dir.into()),
    ))
}

pub fn router(engine: ApiState) -> Router {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route("/api/requests/{id}", get(get_request).patch(update_request))
        .route("/api/requests/{id}/actions", post(act_on_request))
        .route("/api/requests/{id}/comments", post(add_comment).get(list_comments))
        .with_state(engine)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AttachmentBody {
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub contract_no: String,
    pub customer_name: Option<String>,
    /// Monetary amounts travel as strings to avoid float rounding.
    pub contract_value: Option<String>,
    pub settlement_amount: Option<String>,
    pub remark: Option<String>,
    pub attachment_ref: Option<String>,
    pub attachment: Option<AttachmentBody>,
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub decision: String,
    pub actor: String,
    pub comment: Option<String>,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResubmitBody {
    pub contract_no: Option<String>,
    pub customer_name: Option<String>,
    pub contract_value: Option<String>,
    pub settlement_amount: Option<String>,
    pub remark: Option<String>,
    pub attachment_ref: Option<String>,
    pub attachment: Option<AttachmentBody>,
    pub actor: String,
    #[serde(default)]
    pub skip_reset: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub author: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub role: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    pub id: String,
    pub contract_no: String,
    pub customer_name: Option<String>,
    pub contract_value: Option<String>,
    pub settlement_amount: Option<String>,
    pub remark: Option<String>,
    pub attachment_ref: Option<String>,
    pub status: String,
    pub current_step: Option<String>,
    pub version: i64,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ClosingRequest> for RequestView {
    fn from(request: ClosingRequest) -> Self {
        Self {
            id: request.id.0,
            contract_no: request.contract_no,
            customer_name: request.customer_name,
            contract_value: request.contract_value.map(|value| value.to_string()),
            settlement_amount: request.settlement_amount.map(|value| value.to_string()),
            remark: request.remark,
            attachment_ref: request.attachment_ref,
            status: request.status.as_str().to_string(),
            current_step: request.current_step,
            version: request.version,
            created_by: request.created_by,
            created_at: request.created_at.to_rfc3339(),
            updated_at: request.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionView {
    pub id: String,
    pub seq: i64,
    pub step_key: String,
    pub step_label: String,
    pub role: String,
    pub result: String,
    pub comment: Option<String>,
    pub actor: String,
    pub attachment_refs: Vec<String>,
    pub acted_at: String,
}

impl From<ActionRecord> for ActionView {
    fn from(record: ActionRecord) -> Self {
        Self {
            id: record.id,
            seq: record.seq,
            step_key: record.step_key,
            step_label: record.step_label,
            role: record.role,
            result: record.result.as_str().to_string(),
            comment: record.comment,
            actor: record.actor,
            attachment_refs: record.attachment_refs,
            acted_at: record.acted_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at: String,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            author: comment.author,
            body: comment.body,
            created_at: comment.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestEnvelope {
    pub request: RequestView,
    pub history: Vec<ActionView>,
}

impl From<RequestWithHistory> for RequestEnvelope {
    fn from(outcome: RequestWithHistory) -> Self {
        Self {
            request: outcome.request.into(),
            history: outcome.history.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailEnvelope {
    pub request: RequestView,
    pub history: Vec<ActionView>,
    pub comments: Vec<CommentView>,
}

impl From<RequestDetail> for DetailEnvelope {
    fn from(detail: RequestDetail) -> Self {
        Self {
            request: detail.request.into(),
            history: detail.history.into_iter().map(Into::into).collect(),
            comments: detail.comments.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        let status = match &value {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Conflict(_) => StatusCode::CONFLICT,
            WorkflowError::Store(message) => {
                error!(event_name = "api.store_failure", error = %message, "store failure");
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal storage failure".to_string(),
                };
            }
        };
        Self { status, message: value.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn parse_amount(field: &str, raw: Option<String>) -> Result<Option<Decimal>, ApiError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<Decimal>()
            .map_err(|_| ApiError::bad_request(format!("{field} is not a valid decimal amount")))
    })
    .transpose()
}

fn decode_attachment(body: Option<AttachmentBody>) -> Result<Option<AttachmentPayload>, ApiError> {
    body.map(|attachment| {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(attachment.content_base64.as_bytes())
            .map_err(|_| ApiError::bad_request("attachment content is not valid base64"))?;
        Ok(AttachmentPayload { file_name: attachment.file_name, bytes })
    })
    .transpose()
}

pub async fn create_request(
    State(engine): State<ApiState>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<RequestEnvelope>), ApiError> {
    let input = SubmitInput {
        contract_no: body.contract_no,
        customer_name: body.customer_name,
        contract_value: parse_amount("contract_value", body.contract_value)?,
        settlement_amount: parse_amount("settlement_amount", body.settlement_amount)?,
        remark: body.remark,
        attachment_ref: body.attachment_ref,
        attachment: decode_attachment(body.attachment)?,
        created_by: body.created_by,
    };
    let outcome = engine.submit(input).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

pub async fn list_requests(
    State(engine): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            RequestStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status filter `{raw}`")))
        })
        .transpose()?;

    let requests = engine
        .list(&ListFilter { role: query.role, created_by: query.created_by, status })
        .await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

pub async fn get_request(
    State(engine): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DetailEnvelope>, ApiError> {
    let detail = engine.get(&RequestId(id)).await?;
    Ok(Json(detail.into()))
}

pub async fn update_request(
    State(engine): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ResubmitBody>,
) -> Result<Json<RequestEnvelope>, ApiError> {
    let input = ResubmitInput {
        request_id: RequestId(id),
        contract_no: body.contract_no,
        customer_name: body.customer_name,
        contract_value: parse_amount("contract_value", body.contract_value)?,
        settlement_amount: parse_amount("settlement_amount", body.settlement_amount)?,
        remark: body.remark,
        attachment_ref: body.attachment_ref,
        attachment: decode_attachment(body.attachment)?,
        actor: body.actor,
        skip_reset: body.skip_reset,
    };
    let outcome = engine.resubmit(input).await?;
    Ok(Json(outcome.into()))
}

pub async fn act_on_request(
    State(engine): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ActionBody>,
) -> Result<Json<RequestEnvelope>, ApiError> {
    let decision = Decision::parse(&body.decision).ok_or_else(|| {
        ApiError::bad_request(format!(
            "unknown decision `{}`, expected approve, reject or send_back",
            body.decision
        ))
    })?;

    let outcome = engine
        .act(ActionInput {
            request_id: RequestId(id),
            decision,
            actor: body.actor,
            comment: body.comment,
            attachment_refs: body.attachment_refs,
        })
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn add_comment(
    State(engine): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    let comment = engine
        .add_comment(CommentInput { request_id: RequestId(id), author: body.author, body: body.body })
        .await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

pub async fn list_comments(
    State(engine): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    let comments = engine.list_comments(&RequestId(id)).await?;
    Ok(Json(comments.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::Json;
    use base64::Engine as _;

    use closeflow_db::{connect_with_settings, migrations};

    use super::*;

    async fn setup() -> (ApiState, tempfile::TempDir) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let dir = tempfile::tempdir().expect("tempdir");
        (build_engine(pool, dir.path()), dir)
    }

    fn submit_body(contract_no: &str) -> SubmitBody {
        SubmitBody {
            contract_no: contract_no.to_string(),
            customer_name: Some("Aurora Logistics".to_string()),
            contract_value: Some("12500.00".to_string()),
            settlement_amount: Some("11800.00".to_string()),
            remark: None,
            attachment_ref: None,
            attachment: None,
            created_by: "alex@example.com".to_string(),
        }
    }

    async fn create(engine: &ApiState, contract_no: &str) -> RequestEnvelope {
        let (status, Json(envelope)) =
            create_request(State(engine.clone()), Json(submit_body(contract_no)))
                .await
                .expect("create");
        assert_eq!(status, StatusCode::CREATED);
        envelope
    }

    #[tokio::test]
    async fn create_returns_created_with_seeded_ledger() {
        let (engine, _dir) = setup().await;
        let envelope = create(&engine, "CT-2026-0200").await;

        assert_eq!(envelope.request.status, "under_review");
        assert_eq!(envelope.request.current_step.as_deref(), Some("manager_review"));
        assert_eq!(envelope.request.contract_value.as_deref(), Some("12500.00"));
        assert_eq!(envelope.history.len(), 1);
        assert_eq!(envelope.history[0].result, "submitted");
    }

    #[tokio::test]
    async fn create_accepts_inline_base64_attachments() {
        let (engine, dir) = setup().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7 closing");

        let (status, Json(envelope)) = create_request(
            State(engine.clone()),
            Json(SubmitBody {
                attachment: Some(AttachmentBody {
                    file_name: "contract.pdf".to_string(),
                    content_base64: encoded,
                }),
                ..submit_body("CT-2026-0201")
            }),
        )
        .await
        .expect("create");

        assert_eq!(status, StatusCode::CREATED);
        let reference = envelope.request.attachment_ref.expect("attachment reference");
        assert!(reference.starts_with("att/"));
        let written = std::fs::read(dir.path().join(&reference)).expect("attachment on disk");
        assert_eq!(written, b"%PDF-1.7 closing");
    }

    #[tokio::test]
    async fn malformed_base64_is_rejected_before_the_engine_runs() {
        let (engine, _dir) = setup().await;

        let error = create_request(
            State(engine.clone()),
            Json(SubmitBody {
                attachment: Some(AttachmentBody {
                    file_name: "contract.pdf".to_string(),
                    content_base64: "@@not-base64@@".to_string(),
                }),
                ..submit_body("CT-2026-0202")
            }),
        )
        .await
        .expect_err("bad base64");

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_decimal_amounts_are_rejected() {
        let (engine, _dir) = setup().await;

        let error = create_request(
            State(engine),
            Json(SubmitBody {
                contract_value: Some("twelve thousand".to_string()),
                ..submit_body("CT-2026-0203")
            }),
        )
        .await
        .expect_err("bad amount");

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert!(error.message.contains("contract_value"));
    }

    #[tokio::test]
    async fn decisions_drive_the_chain_and_unknown_decisions_are_rejected() {
        let (engine, _dir) = setup().await;
        let envelope = create(&engine, "CT-2026-0204").await;
        let id = envelope.request.id.clone();

        let Json(advanced) = act_on_request(
            State(engine.clone()),
            Path(id.clone()),
            Json(ActionBody {
                decision: "approve".to_string(),
                actor: "morgan@example.com".to_string(),
                comment: Some("verified against annex".to_string()),
                attachment_refs: Vec::new(),
            }),
        )
        .await
        .expect("approve");
        assert_eq!(advanced.request.current_step.as_deref(), Some("finance_review"));
        assert_eq!(advanced.request.version, 2);

        let error = act_on_request(
            State(engine),
            Path(id),
            Json(ActionBody {
                decision: "escalate".to_string(),
                actor: "morgan@example.com".to_string(),
                comment: None,
                attachment_refs: Vec::new(),
            }),
        )
        .await
        .expect_err("unknown decision");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn finalized_requests_conflict_and_missing_requests_are_not_found() {
        let (engine, _dir) = setup().await;
        let envelope = create(&engine, "CT-2026-0205").await;
        let id = envelope.request.id.clone();

        let reject = |engine: ApiState, id: String| async move {
            act_on_request(
                State(engine),
                Path(id),
                Json(ActionBody {
                    decision: "reject".to_string(),
                    actor: "morgan@example.com".to_string(),
                    comment: None,
                    attachment_refs: Vec::new(),
                }),
            )
            .await
        };

        reject(engine.clone(), id.clone()).await.expect("first reject");
        let conflict = reject(engine.clone(), id).await.expect_err("terminal");
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let missing = get_request(State(engine), Path("CR-missing".to_string()))
            .await
            .expect_err("unknown id");
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_resubmits_after_send_back() {
        let (engine, _dir) = setup().await;
        let envelope = create(&engine, "CT-2026-0206").await;
        let id = envelope.request.id.clone();

        act_on_request(
            State(engine.clone()),
            Path(id.clone()),
            Json(ActionBody {
                decision: "send_back".to_string(),
                actor: "morgan@example.com".to_string(),
                comment: Some("settlement amount mismatch".to_string()),
                attachment_refs: Vec::new(),
            }),
        )
        .await
        .expect("send back");

        let Json(resubmitted) = update_request(
            State(engine),
            Path(id),
            Json(ResubmitBody {
                settlement_amount: Some("11750.00".to_string()),
                actor: "alex@example.com".to_string(),
                ..ResubmitBody::default()
            }),
        )
        .await
        .expect("resubmit");

        assert_eq!(resubmitted.request.status, "under_review");
        assert_eq!(resubmitted.request.current_step.as_deref(), Some("manager_review"));
        assert_eq!(resubmitted.request.settlement_amount.as_deref(), Some("11750.00"));
        assert_eq!(resubmitted.history.last().map(|record| record.result.as_str()), Some("resubmitted"));
    }

    #[tokio::test]
    async fn list_filters_by_role_and_rejects_unknown_statuses() {
        let (engine, _dir) = setup().await;
        create(&engine, "CT-2026-0207").await;

        let Json(managers) = list_requests(
            State(engine.clone()),
            Query(ListQuery { role: Some("Manager".to_string()), ..ListQuery::default() }),
        )
        .await
        .expect("manager queue");
        assert_eq!(managers.len(), 1);

        let error = list_requests(
            State(engine),
            Query(ListQuery { status: Some("archived".to_string()), ..ListQuery::default() }),
        )
        .await
        .expect_err("unknown status");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn comments_round_trip_through_the_api() {
        let (engine, _dir) = setup().await;
        let envelope = create(&engine, "CT-2026-0208").await;
        let id = envelope.request.id.clone();

        let (status, Json(comment)) = add_comment(
            State(engine.clone()),
            Path(id.clone()),
            Json(CommentBody {
                author: "finance@example.com".to_string(),
                body: "please attach the signed annex".to_string(),
            }),
        )
        .await
        .expect("add comment");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment.author, "finance@example.com");

        let Json(comments) =
            list_comments(State(engine), Path(id)).await.expect("list comments");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "please attach the signed annex");
    }
}
