use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BotError, BotResult};
use crate::platform::{IncomingMessage, Messenger};

pub const GET_UPDATES: &str = "getUpdates";
pub const SEND_MESSAGE: &str = "sendMessage";
pub const SEND_STICKER: &str = "sendSticker";

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl User {
    /// Username, then first name, then the numeric id.
    pub fn display_name(&self) -> String {
        let present = |name: &Option<String>| name.clone().filter(|n| !n.is_empty());
        present(&self.username)
            .or_else(|| present(&self.first_name))
            .unwrap_or_else(|| self.id.to_string())
    }
}

impl Message {
    /// Flatten into the platform-agnostic shape. Messages without a sender are dropped.
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let from = self.from?;
        Some(IncomingMessage {
            sender_id: from.id,
            sender_name: from.display_name(),
            chat_id: self.chat.id,
            text: self.text,
        })
    }
}

/// Telegram's response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "default_ok")]
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

fn default_ok() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyKeyboard<'a> {
    keyboard: &'a [Vec<String>],
    resize_keyboard: bool,
    one_time_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct SendStickerRequest<'a> {
    chat_id: i64,
    sticker: &'a str,
}

/// Thin JSON-over-HTTP client for `<api_url>/bot<token>/<action>`.
pub struct TelegramClient {
    client: reqwest::Client,
    bot_url: String,
}

impl TelegramClient {
    pub fn new(bot_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_url: bot_url.into(),
        }
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}", self.bot_url, action)
    }

    /// GET `action` with query `params` and decode the envelope's `result`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> BotResult<T> {
        debug!("GET {}", action);
        let response = self
            .client
            .get(self.url(action))
            .query(params)
            .send()
            .await?;
        Self::read_result(response).await
    }

    /// POST a JSON body to `action`. The decoded `result` is returned but callers usually drop it.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        action: &str,
        body: &B,
    ) -> BotResult<serde_json::Value> {
        debug!("POST {}", action);
        let response = self.client.post(self.url(action)).json(body).send().await?;
        Self::read_result(response).await
    }

    async fn read_result<T: DeserializeOwned>(response: reqwest::Response) -> BotResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let description = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|r| r.description)
                .unwrap_or(body);
            return Err(BotError::Api {
                status,
                description,
            });
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body)?;
        if !envelope.ok {
            return Err(BotError::Api {
                status,
                description: envelope.description.unwrap_or_default(),
            });
        }
        envelope.result.ok_or_else(|| BotError::Api {
            status,
            description: "response has no result".to_string(),
        })
    }

    #[allow(dead_code)]
    pub async fn send_sticker(&self, chat_id: i64, sticker: &str) -> BotResult<()> {
        self.post(SEND_STICKER, &SendStickerRequest { chat_id, sticker })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn get_updates(&self, offset: Option<i64>) -> BotResult<Vec<Update>> {
        let params: Vec<(&str, String)> = offset
            .map(|o| vec![("offset", o.to_string())])
            .unwrap_or_default();
        self.get(GET_UPDATES, &params).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> BotResult<()> {
        self.post(
            SEND_MESSAGE,
            &SendMessageRequest {
                chat_id,
                text,
                reply_markup: None,
            },
        )
        .await?;
        Ok(())
    }

    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &[Vec<String>],
    ) -> BotResult<()> {
        self.post(
            SEND_MESSAGE,
            &SendMessageRequest {
                chat_id,
                text,
                reply_markup: Some(ReplyKeyboard {
                    keyboard,
                    resize_keyboard: true,
                    one_time_keyboard: true,
                }),
            },
        )
        .await?;
        Ok(())
    }
}
