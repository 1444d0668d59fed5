use std::sync::Arc;

use tracing::{debug, info};

use crate::error::BotResult;
use crate::platform::{IncomingMessage, Messenger};
use crate::session::{SessionHistory, Submission};
use crate::storage::{DialogStore, SenderCount, StoredDialog};

pub const START_TEXT: &str = "От души братиш, подзалей мне самых сопливых диаложиков.\n\
     Я туповат, поэтому могу принять диалоги в формате:\n\
     — Я не очень хороша, правда?\n\
     — Ты идеальна!\n\
     Ну, то есть каждая реплика на новой строке.";

pub const COMMIT_NUDGE_TEXT: &str = "Надо бы сначала диалогов подкинуть сопливых.";

pub const KEYBOARD_TEXT: &str =
    "От души, надави на /commit или продолжи присылать сопливые диаложики";

pub const COMMIT_BUTTON: &str = "/commit";

/// What an inbound text asks for. Prefix match, checked in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Commit,
    Stat,
    Dialog(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(text: &'a str) -> Option<Self> {
        if text.starts_with("/start") {
            Some(Command::Start)
        } else if text.starts_with("/commit") {
            Some(Command::Commit)
        } else if text.starts_with("/stat") {
            Some(Command::Stat)
        } else if !text.is_empty() {
            Some(Command::Dialog(text))
        } else {
            None
        }
    }
}

/// Routes messages to handlers. Holds no per-user state itself; the
/// caller lends it the [`SessionHistory`].
pub struct DialogMiner {
    messenger: Arc<dyn Messenger>,
    store: Arc<dyn DialogStore>,
    keyboard: Vec<Vec<String>>,
    extra: String,
}

impl DialogMiner {
    pub fn new(messenger: Arc<dyn Messenger>, store: Arc<dyn DialogStore>, extra: String) -> Self {
        Self {
            messenger,
            store,
            keyboard: vec![vec![COMMIT_BUTTON.to_string()]],
            extra,
        }
    }

    pub async fn handle_message(
        &self,
        session: &mut SessionHistory,
        msg: IncomingMessage,
    ) -> BotResult<()> {
        let Some(text) = msg.text.as_deref() else {
            debug!("Ignoring non-text message from {}", msg.sender_id);
            return Ok(());
        };

        info!(
            "Message from {} ({}): {}",
            msg.sender_name, msg.sender_id, text
        );

        match Command::parse(text) {
            Some(Command::Start) => self.messenger.send_message(msg.chat_id, START_TEXT).await,
            Some(Command::Commit) => self.commit(session, &msg).await,
            Some(Command::Stat) => self.stat(msg.chat_id).await,
            Some(Command::Dialog(text)) => {
                let submission =
                    Submission::from_text(msg.sender_id, &msg.sender_name, msg.chat_id, text);
                debug!(
                    "Queued {}-line dialog from {}",
                    submission.dialog.len(),
                    msg.sender_id
                );
                session.append(msg.sender_id, submission);
                self.messenger
                    .send_keyboard(msg.chat_id, KEYBOARD_TEXT, &self.keyboard)
                    .await
            }
            None => Ok(()),
        }
    }

    async fn commit(&self, session: &mut SessionHistory, msg: &IncomingMessage) -> BotResult<()> {
        let rows = session
            .pending(msg.sender_id)
            .iter()
            .filter(|s| s.has_content())
            .map(|s| StoredDialog::from_submission(s, &self.extra))
            .collect::<BotResult<Vec<_>>>()?;

        if rows.is_empty() {
            return self
                .messenger
                .send_message(msg.chat_id, COMMIT_NUDGE_TEXT)
                .await;
        }

        self.store.write(&rows).await?;
        session.drain(msg.sender_id);
        info!("Committed {} dialog(s) from {}", rows.len(), msg.sender_name);
        Ok(())
    }

    async fn stat(&self, chat_id: i64) -> BotResult<()> {
        let total = self.store.count_dialogs().await?;
        let per_sender = self.store.dialogs_per_sender().await?;
        self.messenger
            .send_message(chat_id, &format_stats(total, &per_sender))
            .await
    }
}

pub fn format_stats(total: i64, per_sender: &[SenderCount]) -> String {
    let contributions = per_sender
        .iter()
        .map(|c| format!("{}: {}", c.sender_name.trim(), c.dialogs))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Всего диалогов: {}\nВклад:\n{}", total, contributions)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::platform::telegram::Update;
    use crate::storage::sqlite::SqliteStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Text(i64, String),
        Keyboard(i64, String, Vec<Vec<String>>),
    }

    /// Records replies; optionally fails every send.
    #[derive(Default)]
    pub struct FakeMessenger {
        pub sent: Mutex<Vec<Sent>>,
        pub fail_sends: bool,
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn get_updates(&self, _offset: Option<i64>) -> BotResult<Vec<Update>> {
            Ok(Vec::new())
        }

        async fn send_message(&self, chat_id: i64, text: &str) -> BotResult<()> {
            if self.fail_sends {
                return Err(BotError::Api {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    description: "down".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(chat_id, text.to_string()));
            Ok(())
        }

        async fn send_keyboard(
            &self,
            chat_id: i64,
            text: &str,
            keyboard: &[Vec<String>],
        ) -> BotResult<()> {
            if self.fail_sends {
                return Err(BotError::Api {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    description: "down".to_string(),
                });
            }
            self.sent.lock().unwrap().push(Sent::Keyboard(
                chat_id,
                text.to_string(),
                keyboard.to_vec(),
            ));
            Ok(())
        }
    }

    /// Wraps a real store and counts writes.
    pub struct CountingStore {
        inner: SqliteStore,
        pub writes: AtomicUsize,
    }

    impl CountingStore {
        pub fn new() -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                writes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DialogStore for CountingStore {
        async fn write(&self, rows: &[StoredDialog]) -> BotResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.write(rows).await
        }

        async fn count_dialogs(&self) -> BotResult<i64> {
            self.inner.count_dialogs().await
        }

        async fn dialogs_per_sender(&self) -> BotResult<Vec<SenderCount>> {
            self.inner.dialogs_per_sender().await
        }
    }

    fn msg(sender_id: i64, name: &str, text: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            sender_id,
            sender_name: name.to_string(),
            chat_id: sender_id * 10,
            text: text.map(str::to_string),
        }
    }

    fn miner() -> (DialogMiner, Arc<FakeMessenger>, Arc<CountingStore>) {
        let messenger = Arc::new(FakeMessenger::default());
        let store = Arc::new(CountingStore::new());
        let miner = DialogMiner::new(messenger.clone(), store.clone(), "{}".to_string());
        (miner, messenger, store)
    }

    #[test]
    fn test_command_priority_and_prefixes() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/commit@dialog_bot"), Some(Command::Commit));
        assert_eq!(Command::parse("/statistics"), Some(Command::Stat));
        assert_eq!(Command::parse("hi\nthere"), Some(Command::Dialog("hi\nthere")));
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn test_start_sends_instructions() {
        let (miner, messenger, _) = miner();
        let mut session = SessionHistory::new();

        miner
            .handle_message(&mut session, msg(1, "alice", Some("/start")))
            .await
            .unwrap();

        assert_eq!(
            messenger.sent.lock().unwrap().as_slice(),
            &[Sent::Text(10, START_TEXT.to_string())]
        );
        assert!(session.pending(1).is_empty());
    }

    #[tokio::test]
    async fn test_dialog_is_queued_with_keyboard_reply() {
        let (miner, messenger, store) = miner();
        let mut session = SessionHistory::new();

        miner
            .handle_message(&mut session, msg(1, "alice", Some("a\nb\nc")))
            .await
            .unwrap();

        let pending = session.pending(1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dialog, vec!["a", "b", "c"]);
        assert!(!pending[0].needs_further_processing);
        assert_eq!(pending[0].chat_id, 10);
        assert_eq!(
            messenger.sent.lock().unwrap().as_slice(),
            &[Sent::Keyboard(
                10,
                KEYBOARD_TEXT.to_string(),
                vec![vec!["/commit".to_string()]]
            )]
        );
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commit_persists_and_clears() {
        let (miner, _, store) = miner();
        let mut session = SessionHistory::new();

        for text in ["first\nline", "single", "   ", "third\nx\ny"] {
            miner
                .handle_message(&mut session, msg(1, "alice", Some(text)))
                .await
                .unwrap();
        }
        miner
            .handle_message(&mut session, msg(2, "bob", Some("not yet")))
            .await
            .unwrap();
        miner
            .handle_message(&mut session, msg(1, "alice", Some("/commit")))
            .await
            .unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.count_dialogs().await.unwrap(), 4);
        assert!(session.pending(1).is_empty());
        assert_eq!(session.pending(2).len(), 1);
    }

    #[tokio::test]
    async fn test_whitespace_dialog_is_committed() {
        let (miner, messenger, store) = miner();
        let mut session = SessionHistory::new();

        miner
            .handle_message(&mut session, msg(1, "alice", Some("   ")))
            .await
            .unwrap();
        miner
            .handle_message(&mut session, msg(1, "alice", Some("/commit")))
            .await
            .unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.count_dialogs().await.unwrap(), 1);
        assert!(session.pending(1).is_empty());
        assert!(!messenger
            .sent
            .lock()
            .unwrap()
            .contains(&Sent::Text(10, COMMIT_NUDGE_TEXT.to_string())));
    }

    #[tokio::test]
    async fn test_second_commit_nudges() {
        let (miner, messenger, store) = miner();
        let mut session = SessionHistory::new();

        for text in ["a\nb", "/commit", "/commit"] {
            miner
                .handle_message(&mut session, msg(1, "alice", Some(text)))
                .await
                .unwrap();
        }

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            messenger.sent.lock().unwrap().last(),
            Some(&Sent::Text(10, COMMIT_NUDGE_TEXT.to_string()))
        );
    }

    #[tokio::test]
    async fn test_commit_for_unknown_sender_nudges() {
        let (miner, messenger, store) = miner();
        let mut session = SessionHistory::new();

        miner
            .handle_message(&mut session, msg(5, "eve", Some("/commit")))
            .await
            .unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(
            messenger.sent.lock().unwrap().as_slice(),
            &[Sent::Text(50, COMMIT_NUDGE_TEXT.to_string())]
        );
    }

    #[tokio::test]
    async fn test_stat_reports_totals() {
        let (miner, messenger, _) = miner();
        let mut session = SessionHistory::new();

        for (id, name, text) in [(1, "alice", "a\nb"), (1, "alice", "c"), (2, "bob", "d\ne")] {
            miner
                .handle_message(&mut session, msg(id, name, Some(text)))
                .await
                .unwrap();
        }
        for (id, name) in [(1, "alice"), (2, "bob")] {
            miner
                .handle_message(&mut session, msg(id, name, Some("/commit")))
                .await
                .unwrap();
        }
        miner
            .handle_message(&mut session, msg(3, "carol", Some("/stat")))
            .await
            .unwrap();

        assert_eq!(
            messenger.sent.lock().unwrap().last(),
            Some(&Sent::Text(
                30,
                "Всего диалогов: 3\nВклад:\nalice: 2\nbob: 1".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_missing_text_is_ignored() {
        let (miner, messenger, store) = miner();
        let mut session = SessionHistory::new();

        miner
            .handle_message(&mut session, msg(1, "alice", None))
            .await
            .unwrap();
        miner
            .handle_message(&mut session, msg(1, "alice", Some("")))
            .await
            .unwrap();

        assert!(messenger.sent.lock().unwrap().is_empty());
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(session.senders(), 0);
    }

    #[tokio::test]
    async fn test_reply_failure_surfaces_but_keeps_submission() {
        let messenger = Arc::new(FakeMessenger {
            fail_sends: true,
            ..Default::default()
        });
        let store = Arc::new(CountingStore::new());
        let miner = DialogMiner::new(messenger, store, "{}".to_string());
        let mut session = SessionHistory::new();

        let result = miner
            .handle_message(&mut session, msg(1, "alice", Some("hello\nthere")))
            .await;

        assert!(result.is_err());
        assert_eq!(session.pending(1).len(), 1);
    }

    #[test]
    fn test_format_stats_trims_names() {
        let counts = vec![
            SenderCount {
                sender_name: "alice     ".to_string(),
                dialogs: 4,
            },
            SenderCount {
                sender_name: "bob".to_string(),
                dialogs: 1,
            },
        ];
        assert_eq!(
            format_stats(5, &counts),
            "Всего диалогов: 5\nВклад:\nalice: 4\nbob: 1"
        );
    }
}
