//! Reply side of the api role: completes pending records from the node inbox
//! and records worker announcements.

use crate::domain::envelope::{Envelope, Token};
use crate::domain::pending::PendingRequestStore;
use dashmap::DashMap;
use serde::Serialize;
use shared_bus::{BusMessage, Subscription};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes replies arriving on `<inbox>.*` to their waiting requests.
pub struct ResponseRouter {
    pending: Arc<PendingRequestStore>,
}

impl ResponseRouter {
    pub fn new(pending: Arc<PendingRequestStore>) -> Self {
        Self { pending }
    }

    /// Consume `replies` until the subscription ends.
    pub async fn run(self, mut replies: Subscription) {
        while let Some(msg) = replies.recv().await {
            self.route(&msg);
        }
        debug!(pattern = replies.pattern(), "Reply subscription closed");
    }

    /// Complete the record the reply belongs to. Returns false if dropped.
    pub fn route(&self, msg: &BusMessage) -> bool {
        let (token, result) = match Envelope::decode(&msg.payload) {
            Ok(envelope) => (envelope.token, envelope.into_result()),
            // Raw reply: the inbox subject still names the token
            Err(e) => match msg.last_token().parse::<Token>() {
                Ok(token) => (token, Ok(msg.payload_text())),
                Err(_) => {
                    warn!(subject = %msg.subject, error = %e, "Undecodable reply dropped");
                    return false;
                }
            },
        };

        self.pending.complete(token, result)
    }
}

/// A worker announcement seen on the discovery subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub environment: String,
    pub usage: String,
}

/// Worker announcements by deployment identity.
#[derive(Default)]
pub struct AnnouncementRegistry {
    entries: DashMap<String, String>,
}

impl AnnouncementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, msg: &BusMessage) {
        // api.<environment>; the version part may contain dots
        let Some(environment) = msg.subject.strip_prefix("api.") else {
            return;
        };
        let usage = msg.payload_text();
        info!(environment = %environment, usage = %usage, "Worker announced");
        self.entries.insert(environment.to_string(), usage);
    }

    pub async fn run(self: Arc<Self>, mut announcements: Subscription) {
        while let Some(msg) = announcements.recv().await {
            self.record(&msg);
        }
    }

    /// Announcements sorted by environment.
    pub fn list(&self) -> Vec<Announcement> {
        let mut all: Vec<Announcement> = self
            .entries
            .iter()
            .map(|e| Announcement {
                environment: e.key().clone(),
                usage: e.value().clone(),
            })
            .collect();
        all.sort_by(|a, b| a.environment.cmp(&b.environment));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
