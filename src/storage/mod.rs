pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::BotResult;
use crate::session::Submission;

pub const DIALOGS_TABLE: &str = "dialogs_data_set";

/// Rows per INSERT statement. Five binds a row keeps this well under both
/// SQLite's and PostgreSQL's bind-parameter limits.
pub const WRITE_CHUNK_ROWS: usize = 1000;

/// One row of `dialogs_data_set`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDialog {
    pub sender_id: i64,
    pub sender_name: String,
    /// JSON array of the dialog lines
    pub dialog: String,
    /// 1 when the dialog still has to be split by hand, else 0
    pub need_to_process: i32,
    pub extra: String,
}

impl StoredDialog {
    pub fn from_submission(submission: &Submission, extra: &str) -> BotResult<Self> {
        Ok(Self {
            sender_id: submission.sender_id,
            sender_name: submission.sender_name.clone(),
            dialog: serde_json::to_string(&submission.dialog)?,
            need_to_process: i32::from(submission.needs_further_processing),
            extra: extra.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderCount {
    pub sender_name: String,
    pub dialogs: i64,
}

/// Where committed dialogs go.
///
/// Rows are only ever inserted; nothing here updates or deletes.
#[async_trait]
pub trait DialogStore: Send + Sync {
    /// Insert all rows in one transaction, one multi-row statement per
    /// [`WRITE_CHUNK_ROWS`] rows. An empty batch is a no-op.
    async fn write(&self, rows: &[StoredDialog]) -> BotResult<()>;

    /// Total number of stored dialogs.
    async fn count_dialogs(&self) -> BotResult<i64>;

    /// Dialog counts grouped by sender name, ordered by name.
    async fn dialogs_per_sender(&self) -> BotResult<Vec<SenderCount>>;
}

/// Column list shared by both backends' INSERT.
pub(crate) fn insert_prefix() -> String {
    format!(
        "INSERT INTO {} (sender_id, sender_name, dialog, need_to_process, extra) ",
        DIALOGS_TABLE
    )
}

pub(crate) fn count_query() -> String {
    format!("SELECT COUNT(*) FROM {}", DIALOGS_TABLE)
}

pub(crate) fn per_sender_query() -> String {
    format!(
        "SELECT sender_name, COUNT(dialog) FROM {} GROUP BY sender_name ORDER BY sender_name",
        DIALOGS_TABLE
    )
}
