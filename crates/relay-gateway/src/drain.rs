//! Drain signal shared by the HTTP surface, the worker loop and shutdown.

use std::sync::Arc;
use tokio::sync::watch;

/// One-way switch from serving to draining.
///
/// Cloned into every component that must stop taking new work. Once begun a
/// drain cannot be undone.
#[derive(Clone)]
pub struct DrainController {
    state: Arc<watch::Sender<bool>>,
}

impl DrainController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Start draining. Returns false if a drain was already in progress.
    pub fn begin(&self) -> bool {
        self.state.send_if_modified(|draining| {
            if *draining {
                false
            } else {
                *draining = true;
                true
            }
        })
    }

    pub fn is_draining(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once a drain has begun.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // the sender lives in self, so changed() cannot fail here
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for DrainController {
    fn default() -> Self {
        Self::new()
    }
}
