use sqlx::Row;

use closeflow_core::domain::comment::Comment;
use closeflow_core::domain::request::RequestId;
use closeflow_core::workflow::store::CommentLog;
use closeflow_core::StoreError;

use super::{db_err, decode_datetime, decode_err};
use crate::DbPool;

pub struct SqlCommentLog {
    pool: DbPool,
}

impl SqlCommentLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Result<Comment, StoreError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let request_id: String = row.try_get("request_id").map_err(decode_err)?;
    let author: String = row.try_get("author").map_err(decode_err)?;
    let body: String = row.try_get("body").map_err(decode_err)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Comment {
        id,
        request_id: RequestId(request_id),
        author,
        body,
        created_at: decode_datetime(&created_at_str, "created_at")?,
    })
}

#[async_trait::async_trait]
impl CommentLog for SqlCommentLog {
    async fn append(&self, comment: &Comment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO request_comment (id, request_id, author, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.request_id.0)
        .bind(&comment.author)
        .bind(&comment.body)
        .bind(comment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, request_id, author, body, created_at
             FROM request_comment
             WHERE request_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_comment).collect()
    }
}
