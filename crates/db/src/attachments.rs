use std::path::{Path, PathBuf};

use uuid::Uuid;

use closeflow_core::workflow::store::{AttachmentPayload, AttachmentStore};
use closeflow_core::StoreError;

/// Filesystem-backed attachment store. Each upload lands under its own
/// UUID directory so colliding file names never overwrite each other; the
/// returned reference is the path relative to the store root.
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Strips any directory components a client smuggled into the file name.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "attachment".to_string()
    } else {
        base.to_string()
    }
}

fn io_err(error: std::io::Error) -> StoreError {
    StoreError::Database(format!("attachment store: {error}"))
}

#[async_trait::async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn put(&self, payload: &AttachmentPayload) -> Result<String, StoreError> {
        let file_name = sanitize_file_name(&payload.file_name);
        let reference = format!("att/{}/{file_name}", Uuid::new_v4());
        let target = self.root.join(&reference);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, &payload.bytes).await.map_err(io_err)?;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use closeflow_core::workflow::store::{AttachmentPayload, AttachmentStore};

    use super::{sanitize_file_name, FsAttachmentStore};

    #[tokio::test]
    async fn put_writes_bytes_under_reference() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsAttachmentStore::new(dir.path());

        let payload = AttachmentPayload {
            file_name: "settlement.pdf".to_string(),
            bytes: b"%PDF-1.7 fake".to_vec(),
        };
        let reference = store.put(&payload).await.expect("put");

        assert!(reference.starts_with("att/"));
        assert!(reference.ends_with("/settlement.pdf"));
        let written = tokio::fs::read(dir.path().join(&reference)).await.expect("read back");
        assert_eq!(written, payload.bytes);
    }

    #[tokio::test]
    async fn same_file_name_yields_distinct_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsAttachmentStore::new(dir.path());
        let payload = AttachmentPayload {
            file_name: "evidence.png".to_string(),
            bytes: vec![1, 2, 3],
        };

        let first = store.put(&payload).await.expect("first put");
        let second = store.put(&payload).await.expect("second put");
        assert_ne!(first, second);
    }

    #[test]
    fn sanitize_drops_directory_components() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("reports\\q4.xlsx"), "q4.xlsx");
        assert_eq!(sanitize_file_name("  "), "attachment");
        assert_eq!(sanitize_file_name(".."), "attachment");
        assert_eq!(sanitize_file_name("plain.txt"), "plain.txt");
    }
}
