//! Correlation envelope and tokens.
//!
//! The envelope is the JSON unit carried on `<role>.json.<command>` subjects
//! and on reply subjects:
//!
//! ```json
//! {"token": 42, "payload": "hello", "reply_to": "resp.42", "command": "put"}
//! ```
//!
//! `token` is set once by the originator and copied unchanged into the reply.
//! An empty `reply_to` marks a one-way command.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Identifies one logical request for the lifetime of its originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(u64);

impl Token {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Token derived from content, used for raw requests that carry none.
    ///
    /// Identical payloads map to the same token.
    pub fn from_digest(payload: &[u8]) -> Self {
        let digest = Sha256::digest(payload);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(head))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Token {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Per-process token source.
///
/// High 32 bits: random node prefix chosen at startup. Low 32 bits: a
/// counter. Two ingress nodes sharing a worker pool collide only if they
/// draw the same prefix.
#[derive(Debug)]
pub struct TokenGenerator {
    prefix: u64,
    counter: AtomicU32,
}

impl TokenGenerator {
    pub fn new() -> Self {
        Self::with_prefix(rand::random::<u32>())
    }

    pub fn with_prefix(prefix: u32) -> Self {
        Self {
            prefix: u64::from(prefix) << 32,
            counter: AtomicU32::new(1),
        }
    }

    /// Next token. The counter wraps after 2^32 tokens.
    pub fn next_token(&self) -> Token {
        let low = self.counter.fetch_add(1, Ordering::Relaxed);
        Token(self.prefix | u64::from(low))
    }

    pub fn prefix(&self) -> u32 {
        (self.prefix >> 32) as u32
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Envelope decode/encode failures.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The message exchanged over the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub token: Token,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub reply_to: String,
    #[serde(default)]
    pub command: String,
    /// Set on replies whose computation failed; `payload` is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// A request that expects a reply on `reply_to`.
    pub fn request(
        token: Token,
        payload: impl Into<String>,
        reply_to: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            token,
            payload: payload.into(),
            reply_to: reply_to.into(),
            command: command.into(),
            error: None,
        }
    }

    /// A fire-and-forget command.
    pub fn one_way(token: Token, payload: impl Into<String>, command: impl Into<String>) -> Self {
        Self::request(token, payload, "", command)
    }

    pub fn expects_reply(&self) -> bool {
        !self.reply_to.is_empty()
    }

    /// Successful reply carrying `result`. Replies never ask for a reply.
    pub fn reply(&self, result: impl Into<String>) -> Self {
        Self {
            token: self.token,
            payload: result.into(),
            reply_to: String::new(),
            command: self.command.clone(),
            error: None,
        }
    }

    /// Failed reply.
    pub fn error_reply(&self, error: impl Into<String>) -> Self {
        Self {
            token: self.token,
            payload: String::new(),
            reply_to: String::new(),
            command: self.command.clone(),
            error: Some(error.into()),
        }
    }

    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Payload on success, error text on failure.
    pub fn into_result(self) -> Result<String, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_shape() {
        let env = Envelope::request(Token::new(42), "hello", "resp.42", "put");
        let json: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();

        assert_eq!(json["token"], 42);
        assert_eq!(json["payload"], "hello");
        assert_eq!(json["reply_to"], "resp.42");
        assert_eq!(json["command"], "put");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let env = Envelope::decode(br#"{"token": 7}"#).unwrap();
        assert_eq!(env.token, Token::new(7));
        assert!(!env.expects_reply());
        assert!(env.command.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Envelope::decode(b"not json").is_err());
        assert!(Envelope::decode(br#"{"payload": "no token"}"#).is_err());
    }

    #[test]
    fn test_reply_keeps_token_and_clears_reply_to() {
        let req = Envelope::request(Token::new(9), "in", "_INBOX.a.b.9", "render");
        let reply = req.reply("out");

        assert_eq!(reply.token, req.token);
        assert_eq!(reply.payload, "out");
        assert!(!reply.expects_reply());
        assert_eq!(reply.into_result(), Ok("out".to_string()));

        let failed = req.error_reply("boom");
        assert_eq!(failed.token, req.token);
        assert_eq!(failed.into_result(), Err("boom".to_string()));
    }

    #[test]
    fn test_generator_is_unique_and_prefixed() {
        let generator = TokenGenerator::with_prefix(0xABCD);
        let tokens: HashSet<Token> = (0..1000).map(|_| generator.next_token()).collect();

        assert_eq!(tokens.len(), 1000);
        assert!(tokens.iter().all(|t| t.get() >> 32 == 0xABCD));
        assert_eq!(generator.prefix(), 0xABCD);
    }

    #[test]
    fn test_digest_token_is_stable() {
        assert_eq!(Token::from_digest(b"hello"), Token::from_digest(b"hello"));
        assert_ne!(Token::from_digest(b"hello"), Token::from_digest(b"world"));
    }

    #[test]
    fn test_token_parse() {
        assert_eq!(" 42 ".parse::<Token>().unwrap(), Token::new(42));
        assert!("x".parse::<Token>().is_err());
        assert_eq!(Token::new(42).to_string(), "42");
    }
}
