use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while polling, dispatching or persisting.
///
/// None of these stop the bot: the polling loop logs them and moves on.
/// [`BotError::is_retryable`] only decides how loudly.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telegram API error ({status}): {description}")]
    Api {
        status: StatusCode,
        description: String,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type BotResult<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Whether waiting for the next iteration could plausibly fix this.
    pub fn is_retryable(&self) -> bool {
        match self {
            BotError::Transport(e) => !e.is_decode() && !e.is_builder(),
            BotError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            BotError::Json(_) => false,
            BotError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            BotError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
        }
    }
}
