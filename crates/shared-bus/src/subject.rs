//! # Subject Matching
//!
//! NATS-compatible subject syntax: tokens separated by `.`, `*` for a single
//! token, `>` for the remaining tail (must be last).

use crate::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Single,
    Tail,
}

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPattern {
    raw: String,
    tokens: Vec<Token>,
}

impl SubjectPattern {
    /// Parse a subscription pattern, wildcards allowed.
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        let parts = split_tokens(pattern)?;
        let last = parts.len() - 1;
        let mut tokens = Vec::with_capacity(parts.len());

        for (i, part) in parts.into_iter().enumerate() {
            let token = match part {
                "*" => Token::Single,
                ">" if i == last => Token::Tail,
                ">" => return Err(BusError::invalid(pattern, "'>' must be the last token")),
                literal => Token::Literal(literal.to_string()),
            };
            tokens.push(token);
        }

        Ok(Self {
            raw: pattern.to_string(),
            tokens,
        })
    }

    /// Original pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a concrete subject matches this pattern.
    pub fn matches(&self, subject: &str) -> bool {
        let mut parts = subject.split('.');

        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Tail => {
                    // '>' needs at least one remaining token
                    return parts.next().is_some_and(|p| !p.is_empty());
                }
                Token::Single => match parts.next() {
                    Some(p) if !p.is_empty() => {}
                    _ => return false,
                },
                Token::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
            }
            if i == self.tokens.len() - 1 {
                return parts.next().is_none();
            }
        }

        false
    }
}

/// Validate a subject used for publishing (no wildcards).
pub fn validate_publish_subject(subject: &str) -> Result<(), BusError> {
    for part in split_tokens(subject)? {
        if part == "*" || part == ">" {
            return Err(BusError::invalid(subject, "wildcards are not allowed when publishing"));
        }
    }
    Ok(())
}

fn split_tokens(subject: &str) -> Result<Vec<&str>, BusError> {
    if subject.is_empty() {
        return Err(BusError::invalid(subject, "subject is empty"));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(BusError::invalid(subject, "subject contains whitespace"));
    }
    let parts: Vec<&str> = subject.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(BusError::invalid(subject, "subject has an empty token"));
    }
    Ok(parts)
}
