pub mod attachments;
pub mod connection;
pub mod migrations;
pub mod repositories;

pub use attachments::FsAttachmentStore;
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{SqlActionLedger, SqlCommentLog, SqlRequestStore};
