//! Process roles.
//!
//! A node runs exactly one role for its whole lifetime. `api` faces HTTP
//! clients; the others are bus workers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the cache key of a request is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeyMode {
    /// `<role>:<token>`
    Token,
    /// `<role>:<sha256(command, payload)>`
    Digest,
}

impl FromStr for CacheKeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "digest" => Ok(Self::Digest),
            other => Err(format!("unknown cache key mode '{}'", other)),
        }
    }
}

/// The closed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Api,
    Ascii,
    Img,
    Ml5,
    Data,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Api, Role::Ascii, Role::Img, Role::Ml5, Role::Data];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Ascii => "ascii",
            Self::Img => "img",
            Self::Ml5 => "ml5",
            Self::Data => "data",
        }
    }

    pub fn is_worker(self) -> bool {
        !matches!(self, Self::Api)
    }

    /// Subscription pattern for raw requests: `<role>.*`
    pub fn subject(self) -> String {
        format!("{}.*", self.as_str())
    }

    /// Subscription pattern for envelope requests: `<role>.json.*`
    pub fn json_subject(self) -> String {
        format!("{}.json.*", self.as_str())
    }

    /// Concrete subject for an envelope request with `command`.
    pub fn json_request_subject(self, command: &str) -> String {
        format!("{}.json.{}", self.as_str(), command)
    }

    /// Concrete subject for a raw request with `command`.
    pub fn request_subject(self, command: &str) -> String {
        format!("{}.{}", self.as_str(), command)
    }

    /// Invocation shape announced on the discovery subject.
    pub fn usage(self) -> &'static str {
        match self {
            Self::Api => "curl 'HOST/?target=ROLE&cmd=CMD&text=TEXT'",
            Self::Ascii => "curl -XPOST --data '{text:TEXT}' HOST/ascii/",
            Self::Img => "curl -F 'image=@IMAGE' HOST/img/",
            Self::Ml5 => "curl HOST/ml5/",
            Self::Data => "broker message api",
        }
    }

    /// Cache key derivation when none is configured.
    ///
    /// `data` caches by token so a read after a write hits without touching
    /// the store; the pure roles cache by content.
    pub fn default_key_mode(self) -> CacheKeyMode {
        match self {
            Self::Data => CacheKeyMode::Token,
            _ => CacheKeyMode::Digest,
        }
    }

    /// Default command used by the worker HTTP surface.
    pub fn default_command(self) -> &'static str {
        match self {
            Self::Api => "",
            Self::Ascii => "render",
            Self::Img => "describe",
            Self::Ml5 => "classify",
            Self::Data => "get",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == wanted)
            .ok_or_else(|| format!("unknown role '{}', expected one of: api data ascii img ml5", s))
    }
}
