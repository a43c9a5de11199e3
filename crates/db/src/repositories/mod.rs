use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use closeflow_core::StoreError;

pub mod action;
pub mod comment;
pub mod request;

pub use action::SqlActionLedger;
pub use comment::SqlCommentLog;
pub use request::SqlRequestStore;

pub(crate) fn db_err(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}

pub(crate) fn decode_err(error: sqlx::Error) -> StoreError {
    StoreError::Decode(error.to_string())
}

pub(crate) fn decode_datetime(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| StoreError::Decode(format!("column `{column}`: {error}")))
}

pub(crate) fn decode_decimal(
    raw: Option<String>,
    column: &str,
) -> Result<Option<Decimal>, StoreError> {
    raw.map(|value| {
        value
            .parse::<Decimal>()
            .map_err(|error| StoreError::Decode(format!("column `{column}`: {error}")))
    })
    .transpose()
}
