//! `data` role: persist payloads and read them back by token.

use crate::domain::envelope::Envelope;
use crate::domain::error::ComputeError;
use crate::ports::outbound::{Compute, RecordStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Commands that read instead of write.
const READ_COMMANDS: &[&str] = &["get", "read"];

pub fn is_read_command(command: &str) -> bool {
    READ_COMMANDS.contains(&command)
}

pub struct DataCompute {
    store: Option<Arc<dyn RecordStore>>,
}

impl DataCompute {
    /// `store` is `None` when the durable store could not be opened; every
    /// request then fails until the node is restarted with a working store.
    pub fn new(store: Option<Arc<dyn RecordStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Compute for DataCompute {
    fn name(&self) -> &'static str {
        "data"
    }

    async fn compute(&self, request: &Envelope) -> Result<String, ComputeError> {
        let store = self
            .store
            .as_ref()
            .ok_or(ComputeError::Unavailable("durable store"))?;

        if is_read_command(&request.command) {
            return store
                .select_first(request.token)
                .await?
                .ok_or(ComputeError::NotFound(request.token));
        }

        let id = store.insert(request.token, &request.payload).await?;
        debug!(token = %request.token, id, "Record stored");
        Ok(request.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteStore;
    use crate::domain::envelope::Token;

    async fn compute() -> DataCompute {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().await.unwrap();
        DataCompute::new(Some(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_write_echoes_and_read_returns() {
        let data = compute().await;

        let put = Envelope::request(Token::new(42), "hello", "resp.42", "put");
        assert_eq!(data.compute(&put).await.unwrap(), "hello");

        let get = Envelope::request(Token::new(42), "", "resp.42", "get");
        assert_eq!(data.compute(&get).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_read_missing_token() {
        let data = compute().await;
        let get = Envelope::one_way(Token::new(7), "", "read");
        assert_eq!(
            data.compute(&get).await,
            Err(ComputeError::NotFound(Token::new(7)))
        );
    }

    #[tokio::test]
    async fn test_without_store() {
        let data = DataCompute::new(None);
        let put = Envelope::one_way(Token::new(1), "x", "put");
        assert_eq!(
            data.compute(&put).await,
            Err(ComputeError::Unavailable("durable store"))
        );
    }
}
