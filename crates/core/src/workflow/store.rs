use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::action::ActionRecord;
use crate::domain::comment::Comment;
use crate::domain::request::{ClosingRequest, RequestId, RequestStatus};
use crate::errors::StoreError;

/// Store-level list filter. The engine has already canonicalized any role
/// filter into a step key before it reaches a store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub current_step: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<RequestStatus>,
}

/// A binary attachment payload handed to an [`AttachmentStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Durable storage for request rows. `create` and `commit_transition` are
/// each a single atomic unit: a request mutation and its ledger append
/// either both land or neither does.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create(
        &self,
        request: &ClosingRequest,
        submitted: &ActionRecord,
    ) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ClosingRequest>, StoreError>;

    /// Persist a computed transition guarded by the version the transition
    /// was computed from. Fails with [`StoreError::VersionMismatch`] when
    /// the row has moved on; `record` is `None` for field-only updates
    /// (resubmit with `skip_reset`).
    async fn commit_transition(
        &self,
        request: &ClosingRequest,
        expected_version: i64,
        record: Option<&ActionRecord>,
    ) -> Result<(), StoreError>;

    /// Requests matching `filter`, newest-first by creation time.
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ClosingRequest>, StoreError>;
}

/// Read side of the append-only decision ledger. Appends happen inside
/// [`RequestStore::create`] / [`RequestStore::commit_transition`] so they
/// share the request row's transaction.
#[async_trait]
pub trait ActionLedger: Send + Sync {
    /// Records for one request in non-decreasing `(acted_at, seq)` order.
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<ActionRecord>, StoreError>;
}

#[async_trait]
pub trait CommentLog: Send + Sync {
    async fn append(&self, comment: &Comment) -> Result<(), StoreError>;
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Comment>, StoreError>;
}

/// Opaque binary store: accepts bytes, returns a reference string. Carries
/// no workflow logic.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put(&self, payload: &AttachmentPayload) -> Result<String, StoreError>;
}

type SharedLedger = Arc<Mutex<HashMap<String, Vec<ActionRecord>>>>;

/// In-memory request store sharing one ledger map with
/// [`InMemoryActionLedger`], mirroring the SQL implementation where both
/// live in the same database.
#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<Mutex<Vec<ClosingRequest>>>,
    ledger: SharedLedger,
    next_seq: Arc<Mutex<i64>>,
}

impl InMemoryRequestStore {
    pub fn ledger(&self) -> InMemoryActionLedger {
        InMemoryActionLedger { ledger: Arc::clone(&self.ledger) }
    }

    fn append_record(&self, record: &ActionRecord) {
        let mut next_seq = lock(&self.next_seq);
        *next_seq += 1;
        let mut stored = record.clone();
        stored.seq = *next_seq;
        lock(&self.ledger).entry(record.request_id.0.clone()).or_default().push(stored);
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(
        &self,
        request: &ClosingRequest,
        submitted: &ActionRecord,
    ) -> Result<(), StoreError> {
        lock(&self.requests).push(request.clone());
        self.append_record(submitted);
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ClosingRequest>, StoreError> {
        Ok(lock(&self.requests).iter().find(|request| request.id == *id).cloned())
    }

    async fn commit_transition(
        &self,
        request: &ClosingRequest,
        expected_version: i64,
        record: Option<&ActionRecord>,
    ) -> Result<(), StoreError> {
        {
            let mut requests = lock(&self.requests);
            let Some(row) = requests.iter_mut().find(|row| row.id == request.id) else {
                return Err(StoreError::Database(format!("request `{}` vanished", request.id.0)));
            };
            if row.version != expected_version {
                return Err(StoreError::VersionMismatch);
            }
            *row = request.clone();
        }
        if let Some(record) = record {
            self.append_record(record);
        }
        Ok(())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<ClosingRequest>, StoreError> {
        let mut matched: Vec<ClosingRequest> = lock(&self.requests)
            .iter()
            .filter(|request| {
                filter
                    .current_step
                    .as_deref()
                    .map_or(true, |step| request.current_step.as_deref() == Some(step))
                    && filter.created_by.as_deref().map_or(true, |by| request.created_by == by)
                    && filter.status.map_or(true, |status| request.status == status)
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(matched)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryActionLedger {
    ledger: SharedLedger,
}

#[async_trait]
impl ActionLedger for InMemoryActionLedger {
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<ActionRecord>, StoreError> {
        let mut records = lock(&self.ledger).get(&id.0).cloned().unwrap_or_default();
        records.sort_by(|left, right| {
            left.acted_at.cmp(&right.acted_at).then(left.seq.cmp(&right.seq))
        });
        Ok(records)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCommentLog {
    comments: Arc<Mutex<Vec<Comment>>>,
}

#[async_trait]
impl CommentLog for InMemoryCommentLog {
    async fn append(&self, comment: &Comment) -> Result<(), StoreError> {
        lock(&self.comments).push(comment.clone());
        Ok(())
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Comment>, StoreError> {
        Ok(lock(&self.comments).iter().filter(|comment| comment.request_id == *id).cloned().collect())
    }
}

/// In-memory attachment store; optionally fails every put to exercise the
/// degrade-to-no-reference path.
#[derive(Clone, Default)]
pub struct InMemoryAttachmentStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_puts: bool,
}

impl InMemoryAttachmentStore {
    pub fn failing() -> Self {
        Self { blobs: Arc::default(), fail_puts: true }
    }

    pub fn stored_count(&self) -> usize {
        lock(&self.blobs).len()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn put(&self, payload: &AttachmentPayload) -> Result<String, StoreError> {
        if self.fail_puts {
            return Err(StoreError::Database("attachment store unavailable".to_owned()));
        }
        let reference = format!("mem/{}/{}", lock(&self.blobs).len(), payload.file_name);
        lock(&self.blobs).insert(reference.clone(), payload.bytes.clone());
        Ok(reference)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
