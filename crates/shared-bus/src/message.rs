//! # Bus Message
//!
//! The transport-level unit: a subject, an optional reply subject and opaque bytes.
//! Higher layers (the relay envelope) are encoded into `payload`.

use bytes::Bytes;

/// A message as carried by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Subject the message was published on.
    pub subject: String,
    /// Bus-native reply subject, if the publisher expects an answer there.
    pub reply: Option<String>,
    /// Opaque content.
    pub payload: Bytes,
}

impl BusMessage {
    /// Create a message without a reply subject.
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            payload: payload.into(),
        }
    }

    /// Attach a reply subject.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        self.reply = if reply.is_empty() { None } else { Some(reply) };
        self
    }

    /// Last token of the subject (`ascii.json.render` -> `render`).
    pub fn last_token(&self) -> &str {
        self.subject.rsplit('.').next().unwrap_or_default()
    }

    /// Payload as UTF-8, replacing invalid sequences.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reply_is_none() {
        let msg = BusMessage::new("ascii.render", "hi").with_reply("");
        assert!(msg.reply.is_none());

        let msg = BusMessage::new("ascii.render", "hi").with_reply("_INBOX.a.1");
        assert_eq!(msg.reply.as_deref(), Some("_INBOX.a.1"));
    }

    #[test]
    fn test_last_token() {
        assert_eq!(BusMessage::new("ascii.json.render", "").last_token(), "render");
        assert_eq!(BusMessage::new("ascii", "").last_token(), "ascii");
    }
}
