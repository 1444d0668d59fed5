use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bot::DialogMiner;
use crate::error::BotResult;
use crate::platform::telegram::Message;
use crate::platform::Messenger;
use crate::session::SessionHistory;

/// The top-level driver: fetch, dispatch one message at a time, sleep, repeat.
///
/// Owns the update cursor and the session history. Neither is persisted, so a
/// restart starts from "everything pending" with empty sessions.
pub struct Poller {
    messenger: Arc<dyn Messenger>,
    miner: DialogMiner,
    session: SessionHistory,
    cursor: Option<i64>,
    interval: Duration,
}

impl Poller {
    pub fn new(messenger: Arc<dyn Messenger>, miner: DialogMiner, interval: Duration) -> Self {
        Self {
            messenger,
            miner,
            session: SessionHistory::new(),
            cursor: None,
            interval,
        }
    }

    /// Last update id seen.
    #[cfg(test)]
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    #[cfg(test)]
    pub fn session(&self) -> &SessionHistory {
        &self.session
    }

    /// Poll until Ctrl+C.
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    /// Poll until `shutdown` resolves. Errors never end the loop.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down, last update id: {:?}", self.cursor);
                    return;
                }
                _ = self.iterate() => {}
            }
        }
    }

    async fn iterate(&mut self) {
        tokio::time::sleep(self.interval).await;
        if let Err(e) = self.poll_once().await {
            if e.is_retryable() {
                warn!("Polling iteration failed, retrying: {}", e);
            } else {
                error!("Polling iteration failed: {}", e);
            }
        }
    }

    /// Fetch one batch and dispatch it in order. Returns the batch size.
    ///
    /// The cursor moves to each update before it is dispatched, so a failing
    /// message is not fetched again but the rest of its batch is.
    pub async fn poll_once(&mut self) -> BotResult<usize> {
        let offset = self.cursor.map(|id| id + 1);
        debug!("Get updates from server, offset {:?}", offset);
        let updates = self.messenger.get_updates(offset).await?;
        info!("Got {} new updates", updates.len());

        let count = updates.len();
        for update in updates {
            self.cursor = Some(update.update_id);
            match update.message.and_then(Message::into_incoming) {
                Some(msg) => self.miner.handle_message(&mut self.session, msg).await?,
                None => debug!("Skipping update {} without a user message", update.update_id),
            }
        }
        if count > 0 {
            debug!("{} sender(s) with uncommitted dialogs", self.session.senders());
        }
        Ok(count)
    }
}
