//! The SMTP transaction in flight.
//!
//! An [`Envelope`] is created by the server before the stream stages run
//! and shared between them as a [`SharedEnvelope`]. Stages talk to each
//! other through its metadata map: the MIME analyzer publishes the part
//! list under [`MIME_PARTS_KEY`], the chunk splitter publishes the stored
//! message id under [`MESSAGE_ID_KEY`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mime::MimePart;
use crate::storage::MessageId;

/// Metadata key holding the ordered MIME part list.
pub const MIME_PARTS_KEY: &str = "MimeParts";

/// Metadata key holding the id assigned by the storage engine.
pub const MESSAGE_ID_KEY: &str = "messageID";

/// A value in the envelope metadata map.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Message id assigned at open.
    MessageId(MessageId),
    /// Ordered MIME parts found so far.
    MimeParts(Vec<MimePart>),
    /// Free-form text.
    Text(String),
}

/// Envelope metadata map.
pub type Values = HashMap<String, Value>;

/// A single SMTP transaction.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Reverse path from `MAIL FROM`.
    pub mail_from: String,
    /// Forward paths from `RCPT TO`, in order.
    pub rcpt_to: Vec<String>,
    /// Argument of `HELO`/`EHLO`.
    pub helo: String,
    /// Remote peer address as reported by the server.
    pub remote_ip: String,
    /// Whether the session was upgraded to TLS.
    pub tls: bool,
    /// Queue id assigned by the server.
    pub queued_id: String,
    /// Metadata shared between stages. `None` until a stage creates it.
    pub values: Option<Values>,
}

impl Envelope {
    /// Creates an envelope with an empty metadata map.
    pub fn new(mail_from: impl Into<String>, rcpt_to: impl Into<String>) -> Self {
        Self {
            mail_from: mail_from.into(),
            rcpt_to: vec![rcpt_to.into()],
            values: Some(Values::new()),
            ..Self::default()
        }
    }

    /// Returns the MIME parts published by the analyzer, if any.
    pub fn mime_parts(&self) -> Option<&[MimePart]> {
        match self.values.as_ref()?.get(MIME_PARTS_KEY)? {
            Value::MimeParts(parts) => Some(parts),
            _ => None,
        }
    }

    /// Replaces the published MIME part list.
    ///
    /// Creates the metadata map if it is missing.
    pub fn set_mime_parts(&mut self, parts: Vec<MimePart>) {
        self.values
            .get_or_insert_with(Values::new)
            .insert(MIME_PARTS_KEY.to_string(), Value::MimeParts(parts));
    }

    /// Returns the message id stored by the chunk splitter, if any.
    pub fn message_id(&self) -> Option<MessageId> {
        match self.values.as_ref()?.get(MESSAGE_ID_KEY)? {
            Value::MessageId(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the first recipient, or an empty string.
    pub fn first_recipient(&self) -> &str {
        self.rcpt_to.first().map(String::as_str).unwrap_or_default()
    }

    /// Wraps the envelope for sharing between stages.
    pub fn into_shared(self) -> SharedEnvelope {
        SharedEnvelope::new(self)
    }
}

/// An envelope shared between the stages of one transaction.
#[derive(Debug, Clone, Default)]
pub struct SharedEnvelope(Arc<RwLock<Envelope>>);

impl SharedEnvelope {
    /// Wraps an envelope.
    pub fn new(envelope: Envelope) -> Self {
        Self(Arc::new(RwLock::new(envelope)))
    }

    /// Locks the envelope for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Envelope> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the envelope for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Envelope> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_parts_absent() {
        let envelope = Envelope::new("a@example.com", "b@example.com");
        assert!(envelope.mime_parts().is_none());
        assert!(envelope.message_id().is_none());
    }

    #[test]
    fn test_set_mime_parts_creates_map() {
        let mut envelope = Envelope::default();
        assert!(envelope.values.is_none());

        envelope.set_mime_parts(vec![MimePart::new("1", 0, 10)]);
        assert_eq!(envelope.mime_parts().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_wrong_value_type_is_ignored() {
        let mut envelope = Envelope::new("a@example.com", "b@example.com");
        if let Some(values) = envelope.values.as_mut() {
            values.insert(MIME_PARTS_KEY.into(), Value::Text("oops".into()));
        }
        assert!(envelope.mime_parts().is_none());
    }

    #[test]
    fn test_shared_envelope_sees_updates() {
        let shared = Envelope::new("a@example.com", "b@example.com").into_shared();
        let other = shared.clone();
        other.write().set_mime_parts(vec![MimePart::new("1", 0, 0)]);
        assert!(shared.read().mime_parts().is_some());
    }

    #[test]
    fn test_first_recipient() {
        let mut envelope = Envelope::default();
        assert_eq!(envelope.first_recipient(), "");
        envelope.rcpt_to.push("x@example.com".into());
        assert_eq!(envelope.first_recipient(), "x@example.com");
    }
}
