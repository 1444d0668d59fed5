pub mod telegram;

use async_trait::async_trait;

use crate::error::BotResult;
use crate::platform::telegram::Update;

/// A text message received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Platform-specific user ID
    pub sender_id: i64,
    /// Username, or the best available stand-in
    pub sender_name: String,
    /// Chat the reply goes to
    pub chat_id: i64,
    /// The message text, absent for stickers, photos and the like
    pub text: Option<String>,
}

/// The subset of the messaging API the bot needs.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Fetch updates newer than `offset - 1`, or everything pending when `offset` is `None`.
    async fn get_updates(&self, offset: Option<i64>) -> BotResult<Vec<Update>>;

    async fn send_message(&self, chat_id: i64, text: &str) -> BotResult<()>;

    /// Send `text` with a one-time reply keyboard.
    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &[Vec<String>],
    ) -> BotResult<()>;
}
