use std::collections::HashMap;

/// One dialog a user sent and has not committed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub sender_id: i64,
    pub sender_name: String,
    pub chat_id: i64,
    pub dialog: Vec<String>,
    /// Single-line submissions still need to be split into replies by hand.
    pub needs_further_processing: bool,
}

impl Submission {
    /// Split `text` into one line per reply.
    pub fn from_text(sender_id: i64, sender_name: &str, chat_id: i64, text: &str) -> Self {
        let dialog: Vec<String> = text.split('\n').map(str::to_string).collect();
        let needs_further_processing = dialog.len() == 1;
        Self {
            sender_id,
            sender_name: sender_name.to_string(),
            chat_id,
            dialog,
            needs_further_processing,
        }
    }

    /// Splitting never yields an empty list, so every accepted text counts.
    pub fn has_content(&self) -> bool {
        !self.dialog.is_empty()
    }
}

/// Pending submissions per sender.
///
/// Owned by the polling loop and lent to the dispatcher one message at a time,
/// so there is exactly one writer and no locking.
#[derive(Debug, Default)]
pub struct SessionHistory {
    pending: HashMap<i64, Vec<Submission>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sender_id: i64, submission: Submission) {
        self.pending.entry(sender_id).or_default().push(submission);
    }

    pub fn pending(&self, sender_id: i64) -> &[Submission] {
        self.pending
            .get(&sender_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Take everything pending for `sender_id`, leaving the history empty.
    pub fn drain(&mut self, sender_id: i64) -> Vec<Submission> {
        self.pending.remove(&sender_id).unwrap_or_default()
    }

    pub fn senders(&self) -> usize {
        self.pending.len()
    }
}
