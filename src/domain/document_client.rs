use async_trait::async_trait;
use serde_json::Value;

/// Errors reported by a document backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The named search index does not exist.
    #[error("unknown index `{0}`")]
    UnknownIndex(String),
    /// Connection refused, dropped or timed out after the client's own retries.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with an error.
    #[error("backend error: {0}")]
    Backend(String),
    /// The backend answered with something we could not interpret.
    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn protocol(msg: impl Into<String>) -> Self { Self::Protocol(msg.into()) }
}

/// Kind of document an index is defined over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOn {
    Json,
}

/// A text field projected from a document path, e.g. `$.name AS name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub path: String,
    pub alias: String,
}

impl TextField {
    pub fn new(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self { path: path.into(), alias: alias.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub on: IndexOn,
    pub prefixes: Vec<String>,
    pub fields: Vec<TextField>,
    /// Index every word, including the backend's default stopwords.
    pub keep_stopwords: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub offset: usize,
    pub limit: usize,
}

/// One search hit: the document key and its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub json: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResult {
    pub total: u64,
    pub documents: Vec<RawDocument>,
}

/// Key-value JSON storage plus a full-text index, as seen by the todo store.
///
/// Implementations are shared between tasks and must tolerate concurrent calls.
#[async_trait]
pub trait DocumentClient: Send + Sync + 'static {
    /// Succeeds when the index exists; `ClientError::UnknownIndex` when it does not.
    async fn index_info(&self, index: &str) -> Result<(), ClientError>;
    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<(), ClientError>;
    /// Drops the index definition only; documents stay in place.
    async fn drop_index(&self, index: &str) -> Result<(), ClientError>;
    /// Returns `None` when nothing is stored at `key`.
    async fn json_get(&self, key: &str) -> Result<Option<Value>, ClientError>;
    /// Replaces the whole document at `key`. `false` means the backend declined the write.
    async fn json_set(&self, key: &str, document: &Value) -> Result<bool, ClientError>;
    /// Returns how many documents were removed; zero for a missing key.
    async fn json_del(&self, key: &str) -> Result<u64, ClientError>;
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResult, ClientError>;
}
