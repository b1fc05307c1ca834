use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use futures::future::join_all;
use tracing::instrument;
use uuid::Uuid;

use super::error::StoreError;
use crate::domain::{
    clock::{Clock, SystemClock},
    document_client::{ClientError, DocumentClient, IndexDefinition, IndexOn, RawDocument, SearchQuery, SearchResult, TextField},
    todo::{Todo, TodoDocument, TodoStatus, Todos},
};

pub const TODOS_INDEX: &str = "todos-idx";
pub const TODOS_PREFIX: &str = "todos:";
pub const DEFAULT_SEARCH_LIMIT: usize = 10_000;

const MATCH_ALL: &str = "*";

/// Persists todos as JSON documents under `todos:` and keeps the
/// `todos-idx` search index over their `name` and `status`.
#[derive(Clone)]
pub struct TodoStore {
    client: Arc<dyn DocumentClient>,
    clock: Arc<dyn Clock>,
    search_limit: usize,
}

impl TodoStore {
    pub fn new(client: Arc<dyn DocumentClient>) -> Self {
        Self { client, clock: Arc::new(SystemClock), search_limit: DEFAULT_SEARCH_LIMIT }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound on documents fetched by a single listing or search.
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.create_index_if_not_exists().await
    }

    pub async fn have_index(&self) -> Result<bool, StoreError> {
        match self.client.index_info(TODOS_INDEX).await {
            Ok(()) => {
                tracing::debug!(index = TODOS_INDEX, "index already exists");
                Ok(true)
            }
            Err(ClientError::UnknownIndex(_)) => {
                tracing::debug!(index = TODOS_INDEX, "index does not exist");
                Ok(false)
            }
            Err(source) => Err(backend("have_index")(source)),
        }
    }

    pub async fn create_index_if_not_exists(&self) -> Result<(), StoreError> {
        if self.have_index().await? {
            return Ok(());
        }

        tracing::debug!(index = TODOS_INDEX, "creating index");
        if let Err(source) = self.client.create_index(TODOS_INDEX, &index_definition()).await {
            // A concurrent initialize may have created it first.
            if self.have_index().await? {
                tracing::debug!(index = TODOS_INDEX, error = %source, "index created concurrently");
                return Ok(());
            }
            return Err(backend("create_index")(source));
        }
        tracing::debug!(index = TODOS_INDEX, "index created");
        Ok(())
    }

    pub async fn drop_index(&self) -> Result<(), StoreError> {
        if !self.have_index().await? {
            return Ok(());
        }

        self.client.drop_index(TODOS_INDEX).await.map_err(backend("drop_index"))?;
        tracing::debug!(index = TODOS_INDEX, "index dropped");
        Ok(())
    }

    /// Accepts ids with or without the `todos:` prefix.
    pub fn format_id(id: &str) -> String {
        if id.starts_with(TODOS_PREFIX) {
            id.to_string()
        } else {
            format!("{TODOS_PREFIX}{id}")
        }
    }

    #[instrument(skip(self))]
    pub async fn all(&self) -> Result<Todos, StoreError> {
        let result = self.run_query(MATCH_ALL.to_string(), "all").await?;
        self.warn_if_truncated("all", &result);
        to_todos(result)
    }

    #[instrument(skip(self))]
    pub async fn one(&self, id: &str) -> Result<Todo, StoreError> {
        let key = Self::format_id(id);
        let json = self.client.json_get(&key).await.map_err(backend("one"))?;
        match json {
            None | Some(serde_json::Value::Null) => Err(StoreError::not_found(key)),
            Some(json) => serde_json::from_value(json).map_err(|source| StoreError::Corrupt { id: key, source }),
        }
    }

    #[instrument(skip(self))]
    pub async fn search(&self, name: Option<&str>, status: Option<TodoStatus>) -> Result<Todos, StoreError> {
        let query = search_query(name, status);
        tracing::debug!(%query, "searching todos");
        let result = self.run_query(query, "search").await?;
        self.warn_if_truncated("search", &result);
        to_todos(result)
    }

    /// Writes a new todo. An existing document at the same id is replaced.
    #[instrument(skip(self))]
    pub async fn create(&self, id: Option<&str>, name: Option<&str>) -> Result<TodoDocument, StoreError> {
        let Some(name) = name else {
            return Err(StoreError::validation("todo must have a name"));
        };
        let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::format_id(id),
            None => Self::format_id(&Uuid::new_v4().to_string()),
        };

        let now = self.now();
        let todo = TodoDocument {
            id,
            value: Todo { name: name.to_string(), status: TodoStatus::Todo, created_date: now, updated_date: now },
        };

        self.write(&todo.id, &todo.value, "create").await?;
        Ok(todo)
    }

    /// Sets a new status. Concurrent updates of one todo race; the last write wins.
    #[instrument(skip(self))]
    pub async fn update(&self, id: &str, status: TodoStatus) -> Result<Todo, StoreError> {
        let mut todo = self.one(id).await?;
        todo.status = status;
        todo.updated_date = self.next_update(todo.updated_date);

        self.write(&Self::format_id(id), &todo, "update").await?;
        Ok(todo)
    }

    /// Deleting a missing todo is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let key = Self::format_id(id);
        let removed = self.client.json_del(&key).await.map_err(backend("delete"))?;
        tracing::debug!(%key, removed, "deleted todo");
        Ok(())
    }

    /// Deletes every todo, one page of `search_limit` at a time, with the
    /// deletes of a page issued concurrently. Deletes that succeeded stay
    /// applied when others fail; the first failure is reported.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<(), StoreError> {
        let mut attempted = 0;
        loop {
            let page = self.run_query(MATCH_ALL.to_string(), "delete_all").await?;
            if page.total == 0 {
                tracing::debug!(deleted = attempted, "deleted all todos");
                return Ok(());
            }

            attempted += page.documents.len();
            let results = join_all(page.documents.iter().map(|doc| self.client.json_del(&doc.id))).await;
            let mut removed = 0;
            let mut failed = 0;
            let mut first = None;
            for result in results {
                match result {
                    Ok(n) => removed += n,
                    Err(err) => {
                        failed += 1;
                        if first.is_none() {
                            first = Some(err);
                        }
                    }
                }
            }

            if let Some(first) = first {
                tracing::error!(failed, attempted, error = %first, "error deleting todos");
                return Err(StoreError::PartialDelete { failed, attempted, first });
            }
            if removed == 0 {
                tracing::error!(remaining = page.total, "delete_all made no progress");
                return Err(StoreError::Incomplete { remaining: page.total });
            }
        }
    }

    async fn run_query(&self, query: String, operation: &'static str) -> Result<SearchResult, StoreError> {
        let query = SearchQuery { query, offset: 0, limit: self.search_limit };
        self.client.search(TODOS_INDEX, &query).await.map_err(backend(operation))
    }

    fn warn_if_truncated(&self, operation: &'static str, result: &SearchResult) {
        if (result.documents.len() as u64) < result.total {
            tracing::warn!(
                operation,
                total = result.total,
                returned = result.documents.len(),
                limit = self.search_limit,
                "more todos match than the search limit returns"
            );
        }
    }

    async fn write(&self, key: &str, todo: &Todo, operation: &'static str) -> Result<(), StoreError> {
        let document = serde_json::to_value(todo).map_err(|source| StoreError::Corrupt { id: key.to_string(), source })?;
        let stored = self.client.json_set(key, &document).await.map_err(backend(operation))?;
        if !stored {
            tracing::error!(operation, %key, "backend did not acknowledge write");
            return Err(StoreError::WriteFailed { id: key.to_string() });
        }
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> { self.clock.now().trunc_subsecs(0) }

    /// Timestamps are stored at second precision, so an update inside the same
    /// second as the previous one moves forward by a full second.
    fn next_update(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.now();
        if now > previous { now } else { previous + Duration::seconds(1) }
    }
}

fn backend(operation: &'static str) -> impl FnOnce(ClientError) -> StoreError {
    move |source| {
        tracing::error!(operation, error = %source, "todo store backend call failed");
        StoreError::Backend { operation, source }
    }
}

fn index_definition() -> IndexDefinition {
    IndexDefinition {
        on: IndexOn::Json,
        prefixes: vec![TODOS_PREFIX.to_string()],
        fields: vec![TextField::new("$.name", "name"), TextField::new("$.status", "status")],
        keep_stopwords: true,
    }
}

/// Builds the full-text query for the given filters. Without filters the
/// query matches every document.
pub fn search_query(name: Option<&str>, status: Option<TodoStatus>) -> String {
    let mut clauses = Vec::new();
    if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
        clauses.push(format!("@name:({})", escape_query(name)));
    }
    if let Some(status) = status {
        clauses.push(format!("@status:\"{}\"", status.as_str()));
    }

    if clauses.is_empty() { MATCH_ALL.to_string() } else { clauses.join(" ") }
}

/// Backslash-escapes query syntax so user text is matched as plain words.
fn escape_query(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if !(c.is_alphanumeric() || c.is_whitespace() || c == '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn to_todos(result: SearchResult) -> Result<Todos, StoreError> {
    let documents = result.documents.into_iter().map(to_document).collect::<Result<Vec<_>, _>>()?;
    Ok(Todos { total: result.total, documents })
}

fn to_document(raw: RawDocument) -> Result<TodoDocument, StoreError> {
    let value = serde_json::from_value(raw.json).map_err(|source| StoreError::Corrupt { id: raw.id.clone(), source })?;
    Ok(TodoDocument { id: raw.id, value })
}
