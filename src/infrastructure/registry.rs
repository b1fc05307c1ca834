use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{memory_client::MemoryDocumentClient, redis_client::{RedisDocumentClient, RedisSettings}};
use crate::domain::document_client::{ClientError, DocumentClient};

pub const MEMORY_SCHEME: &str = "memory://";

/// Hands out one shared client per backend URL.
///
/// Built once at startup and passed to whatever needs a client. URLs starting
/// with `memory://` get an in-process store; anything else is opened as Redis.
pub struct ClientRegistry {
    settings: RedisSettings,
    clients: Mutex<HashMap<String, Arc<dyn DocumentClient>>>,
}

impl ClientRegistry {
    pub fn new(settings: RedisSettings) -> Self {
        Self { settings, clients: Mutex::new(HashMap::new()) }
    }

    pub async fn client(&self, url: &str) -> Result<Arc<dyn DocumentClient>, ClientError> {
        // Held across the connect so concurrent callers share one connection.
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(url) {
            return Ok(Arc::clone(client));
        }

        let client: Arc<dyn DocumentClient> = if url.starts_with(MEMORY_SCHEME) {
            tracing::info!(%url, "using in-memory document store");
            Arc::new(MemoryDocumentClient::new())
        } else {
            Arc::new(RedisDocumentClient::connect(url, &self.settings).await?)
        };
        clients.insert(url.to_string(), Arc::clone(&client));
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_url_yields_same_client() {
        let registry = ClientRegistry::new(RedisSettings::default());
        let a = registry.client("memory://one").await.unwrap();
        let b = registry.client("memory://one").await.unwrap();
        let c = registry.client("memory://two").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn rejects_malformed_urls() {
        let registry = ClientRegistry::new(RedisSettings::default());
        assert!(registry.client("not a url").await.is_err());
    }
}
