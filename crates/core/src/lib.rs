pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use domain::action::{ActionRecord, ActionResult};
pub use domain::comment::Comment;
pub use domain::request::{ClosingRequest, RequestId, RequestStatus};
pub use errors::{StoreError, WorkflowError};
pub use workflow::engine::{
    ActionInput, CommentInput, ListFilter, RequestDetail, RequestWithHistory, ResubmitInput,
    SubmitInput, WorkflowEngine,
};
pub use workflow::steps::{StepDefinition, StepRegistry};
pub use workflow::store::{
    ActionLedger, AttachmentPayload, AttachmentStore, CommentLog, InMemoryActionLedger,
    InMemoryAttachmentStore, InMemoryCommentLog, InMemoryRequestStore, RequestFilter,
    RequestStore,
};
pub use workflow::transitions::Decision;
