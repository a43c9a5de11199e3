use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::domain::action::{ActionRecord, ActionResult};
use crate::domain::comment::Comment;
use crate::domain::request::{ClosingRequest, RequestId, RequestStatus};
use crate::errors::WorkflowError;
use crate::workflow::steps::{StepDefinition, StepRegistry, SUBMITTER_ROLE, SUBMIT_STEP_KEY};
use crate::workflow::store::{
    ActionLedger, AttachmentPayload, AttachmentStore, CommentLog, RequestFilter, RequestStore,
};
use crate::workflow::transitions::{next_state, Decision};

#[derive(Clone, Debug, Default)]
pub struct SubmitInput {
    pub contract_no: String,
    pub customer_name: Option<String>,
    pub contract_value: Option<Decimal>,
    pub settlement_amount: Option<Decimal>,
    pub remark: Option<String>,
    /// Pre-existing attachment reference, accepted when no bytes are
    /// supplied.
    pub attachment_ref: Option<String>,
    pub attachment: Option<AttachmentPayload>,
    pub created_by: String,
}

#[derive(Clone, Debug)]
pub struct ActionInput {
    pub request_id: RequestId,
    pub decision: Decision,
    pub actor: String,
    pub comment: Option<String>,
    pub attachment_refs: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ResubmitInput {
    pub request_id: RequestId,
    pub contract_no: Option<String>,
    pub customer_name: Option<String>,
    pub contract_value: Option<Decimal>,
    pub settlement_amount: Option<Decimal>,
    pub remark: Option<String>,
    pub attachment_ref: Option<String>,
    pub attachment: Option<AttachmentPayload>,
    pub actor: String,
    /// Allows attachment-only edits on an active request without
    /// restarting the approval chain.
    pub skip_reset: bool,
}

#[derive(Clone, Debug)]
pub struct CommentInput {
    pub request_id: RequestId,
    pub author: String,
    pub body: String,
}

#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub role: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<RequestStatus>,
}

#[derive(Clone, Debug)]
pub struct RequestWithHistory {
    pub request: ClosingRequest,
    pub history: Vec<ActionRecord>,
}

#[derive(Clone, Debug)]
pub struct RequestDetail {
    pub request: ClosingRequest,
    pub history: Vec<ActionRecord>,
    pub comments: Vec<Comment>,
}

/// The approval workflow engine: validates an incoming operation against
/// the request's current state, appends the ledger entry, and commits the
/// computed transition as one atomic unit through the request store.
pub struct WorkflowEngine<R, L, C, A> {
    registry: StepRegistry,
    requests: R,
    actions: L,
    comments: C,
    attachments: A,
}

impl<R, L, C, A> WorkflowEngine<R, L, C, A>
where
    R: RequestStore,
    L: ActionLedger,
    C: CommentLog,
    A: AttachmentStore,
{
    pub fn new(registry: StepRegistry, requests: R, actions: L, comments: C, attachments: A) -> Self {
        Self { registry, requests, actions, comments, attachments }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Create a request and seed its ledger with a `submitted` entry.
    /// Creation completes the nominal submit step, so the active step is
    /// the registry's post-creation step.
    pub async fn submit(&self, input: SubmitInput) -> Result<RequestWithHistory, WorkflowError> {
        if input.contract_no.trim().is_empty() {
            return Err(WorkflowError::Validation("contract_no is required".to_owned()));
        }
        if input.created_by.trim().is_empty() {
            return Err(WorkflowError::Validation("created_by is required".to_owned()));
        }

        let attachment_ref =
            self.resolve_attachment(input.attachment.as_ref(), input.attachment_ref).await;

        let now = Utc::now();
        let request = ClosingRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            contract_no: input.contract_no,
            customer_name: input.customer_name,
            contract_value: input.contract_value,
            settlement_amount: input.settlement_amount,
            remark: input.remark,
            attachment_ref,
            status: RequestStatus::UnderReview,
            current_step: Some(self.registry.post_creation_step_key().to_string()),
            version: 1,
            created_by: input.created_by.clone(),
            created_at: now,
            updated_at: now,
        };

        let submitted = ActionRecord {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            seq: 0,
            step_key: SUBMIT_STEP_KEY.to_string(),
            step_label: self
                .registry
                .step_by_key(SUBMIT_STEP_KEY)
                .map(|step| step.label.clone())
                .unwrap_or_else(|| "Submit".to_string()),
            role: SUBMITTER_ROLE.to_string(),
            result: ActionResult::Submitted,
            comment: None,
            actor: input.created_by,
            attachment_refs: request.attachment_ref.iter().cloned().collect(),
            acted_at: now,
        };

        self.requests.create(&request, &submitted).await?;
        self.with_history(request).await
    }

    /// Apply a reviewer decision to the request's active step.
    pub async fn act(&self, input: ActionInput) -> Result<RequestWithHistory, WorkflowError> {
        let request = self.load(&input.request_id).await?;
        if request.is_terminal() {
            return Err(WorkflowError::Conflict(format!(
                "request `{}` is already finalized as {}",
                request.id.0,
                request.status.as_str()
            )));
        }

        let step = self.active_step(&request)?.clone();

        // The ledger entry captures the step that was active when the
        // decision was taken, even for terminal outcomes.
        let record = ActionRecord {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            seq: 0,
            step_key: step.key.clone(),
            step_label: step.label.clone(),
            role: step.required_role.clone(),
            result: input.decision.action_result(),
            comment: input.comment,
            actor: input.actor,
            attachment_refs: input.attachment_refs,
            acted_at: Utc::now(),
        };

        let next = next_state(&self.registry, &step.key, input.decision);
        let mut updated = request.clone();
        updated.status = next.status;
        updated.current_step = next.current_step;
        updated.updated_at = record.acted_at;
        updated.version = request.version + 1;

        self.requests.commit_transition(&updated, request.version, Some(&record)).await?;
        self.with_history(updated).await
    }

    /// Partial edit of a sent-back or in-flight request. Unless
    /// `skip_reset` is set, the approval chain restarts at the
    /// post-creation step and a `resubmitted` ledger entry is appended.
    pub async fn resubmit(&self, input: ResubmitInput) -> Result<RequestWithHistory, WorkflowError> {
        let request = self.load(&input.request_id).await?;
        if request.is_terminal() {
            return Err(WorkflowError::Conflict(format!(
                "request `{}` is already finalized as {}",
                request.id.0,
                request.status.as_str()
            )));
        }

        let has_field = input.contract_no.is_some()
            || input.customer_name.is_some()
            || input.contract_value.is_some()
            || input.settlement_amount.is_some()
            || input.remark.is_some()
            || input.attachment_ref.is_some()
            || input.attachment.is_some();
        if !has_field {
            return Err(WorkflowError::Validation("no fields to update".to_owned()));
        }

        let mut updated = request.clone();
        if let Some(contract_no) = input.contract_no {
            if contract_no.trim().is_empty() {
                return Err(WorkflowError::Validation("contract_no cannot be empty".to_owned()));
            }
            updated.contract_no = contract_no;
        }
        if let Some(customer_name) = input.customer_name {
            updated.customer_name = Some(customer_name);
        }
        if let Some(contract_value) = input.contract_value {
            updated.contract_value = Some(contract_value);
        }
        if let Some(settlement_amount) = input.settlement_amount {
            updated.settlement_amount = Some(settlement_amount);
        }
        if let Some(remark) = input.remark {
            updated.remark = Some(remark);
        }
        if input.attachment.is_some() || input.attachment_ref.is_some() {
            if let Some(reference) =
                self.resolve_attachment(input.attachment.as_ref(), input.attachment_ref).await
            {
                updated.attachment_ref = Some(reference);
            }
        }

        let now = Utc::now();
        updated.updated_at = now;
        updated.version = request.version + 1;

        let record = if input.skip_reset {
            None
        } else {
            updated.status = RequestStatus::UnderReview;
            updated.current_step = Some(self.registry.post_creation_step_key().to_string());
            Some(ActionRecord {
                id: Uuid::new_v4().to_string(),
                request_id: request.id.clone(),
                seq: 0,
                step_key: SUBMIT_STEP_KEY.to_string(),
                step_label: self
                    .registry
                    .step_by_key(SUBMIT_STEP_KEY)
                    .map(|step| step.label.clone())
                    .unwrap_or_else(|| "Submit".to_string()),
                role: SUBMITTER_ROLE.to_string(),
                result: ActionResult::Resubmitted,
                comment: None,
                actor: input.actor,
                attachment_refs: updated.attachment_ref.iter().cloned().collect(),
                acted_at: now,
            })
        };

        self.requests.commit_transition(&updated, request.version, record.as_ref()).await?;
        self.with_history(updated).await
    }

    pub async fn get(&self, id: &RequestId) -> Result<RequestDetail, WorkflowError> {
        let request = self.load(id).await?;
        let history = self.actions.list_for_request(id).await?;
        let comments = self.comments.list_for_request(id).await?;
        Ok(RequestDetail { request, history, comments })
    }

    /// List requests, newest-first. A role filter is canonicalized to the
    /// step key that role owns; a role owning no step matches nothing.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ClosingRequest>, WorkflowError> {
        let current_step = match filter.role.as_deref() {
            Some(role) => match self.registry.step_key_for_role(role) {
                Some(step_key) => Some(step_key.to_string()),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let store_filter = RequestFilter {
            current_step,
            created_by: filter.created_by.clone(),
            status: filter.status,
        };
        Ok(self.requests.list(&store_filter).await?)
    }

    pub async fn add_comment(&self, input: CommentInput) -> Result<Comment, WorkflowError> {
        if input.body.trim().is_empty() {
            return Err(WorkflowError::Validation("comment text cannot be empty".to_owned()));
        }
        let request = self.load(&input.request_id).await?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            request_id: request.id,
            author: input.author,
            body: input.body,
            created_at: Utc::now(),
        };
        self.comments.append(&comment).await?;
        Ok(comment)
    }

    pub async fn list_comments(&self, id: &RequestId) -> Result<Vec<Comment>, WorkflowError> {
        self.load(id).await?;
        Ok(self.comments.list_for_request(id).await?)
    }

    async fn load(&self, id: &RequestId) -> Result<ClosingRequest, WorkflowError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.0.clone()))
    }

    fn active_step(&self, request: &ClosingRequest) -> Result<&StepDefinition, WorkflowError> {
        let Some(step_key) = request.current_step.as_deref() else {
            return Err(WorkflowError::Validation(format!(
                "request `{}` has no active step",
                request.id.0
            )));
        };
        self.registry.step_by_key(step_key).ok_or_else(|| {
            WorkflowError::Validation(format!(
                "request `{}` references unknown step `{step_key}`",
                request.id.0
            ))
        })
    }

    /// Attachment storage failure never aborts an otherwise valid
    /// operation; it degrades to "no reference stored".
    async fn resolve_attachment(
        &self,
        attachment: Option<&AttachmentPayload>,
        fallback_ref: Option<String>,
    ) -> Option<String> {
        match attachment {
            Some(payload) => match self.attachments.put(payload).await {
                Ok(reference) => Some(reference),
                Err(error) => {
                    warn!(
                        file_name = %payload.file_name,
                        error = %error,
                        "attachment store rejected payload, continuing without a reference"
                    );
                    None
                }
            },
            None => fallback_ref,
        }
    }

    async fn with_history(
        &self,
        request: ClosingRequest,
    ) -> Result<RequestWithHistory, WorkflowError> {
        let history = self.actions.list_for_request(&request.id).await?;
        Ok(RequestWithHistory { request, history })
    }
}
