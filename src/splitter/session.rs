//! Per-transaction state of the chunk splitter.

use tracing::debug;

use crate::address::normalize_address;
use crate::envelope::SharedEnvelope;
use crate::mime::MimePart;
use crate::storage::{MessageId, MessageSummary};

/// Where a session is in its message lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No message open.
    #[default]
    Idle,
    /// A message record was opened.
    Opened,
    /// At least one write went through.
    Streaming,
    /// The message record was finalized.
    Closed,
}

#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) state: SessionState,
    pub(crate) envelope: Option<SharedEnvelope>,
    pub(crate) message_id: Option<MessageId>,
    /// Absolute stream offset of the next byte to arrive.
    pub(crate) position: u64,
    /// Parts before this index are finalized and never rescanned.
    pub(crate) progress: usize,
    /// Bytes handed to the chunk buffer.
    pub(crate) written: u64,
    pub(crate) part_selected: bool,
    subject: String,
    to: String,
    from: String,
}

impl Session {
    pub(crate) fn opened(envelope: SharedEnvelope, id: MessageId) -> Self {
        Self {
            state: SessionState::Opened,
            envelope: Some(envelope),
            message_id: Some(id),
            ..Self::default()
        }
    }

    /// Captures `Subject`, `To` and `From` from the first part. The first
    /// non-empty value of each wins.
    pub(crate) fn capture_headers(&mut self, first: &MimePart) {
        if self.subject.is_empty() {
            if let Some(subject) = first.header("Subject") {
                self.subject = subject.to_owned();
            }
        }
        if self.to.is_empty() {
            capture_address(&mut self.to, first, "To");
        }
        if self.from.is_empty() {
            capture_address(&mut self.from, first, "From");
        }
    }

    /// Moves the progress marker up to the second-to-last part, stopping at
    /// the first part with a boundary that is not behind `pos` yet.
    pub(crate) fn settle(&mut self, parts: &[MimePart], pos: u64) {
        if parts.len() <= 2 {
            return;
        }
        let limit = parts.len() - 2;
        let from = self.progress.min(limit);
        let settled = parts[from..limit]
            .iter()
            .take_while(|part| {
                part.starting_pos <= pos
                    && part.starting_pos_body > 0
                    && part.starting_pos_body < pos
            })
            .count();
        self.progress = from + settled;
    }

    pub(crate) fn summary(&self, queue_id: String) -> MessageSummary {
        MessageSummary {
            subject: self.subject.clone(),
            queue_id,
            to: self.to.clone(),
            from: self.from.clone(),
        }
    }
}

fn capture_address(slot: &mut String, part: &MimePart, field: &str) {
    let Some(value) = part.header(field) else {
        return;
    };
    match normalize_address(value) {
        Ok(address) => *slot = address,
        Err(e) => debug!(field, error = %e, "header address left unset"),
    }
}
