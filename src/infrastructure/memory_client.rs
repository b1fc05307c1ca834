use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::document_client::{ClientError, DocumentClient, IndexDefinition, RawDocument, SearchQuery, SearchResult};

/// In-process document store with a small full-text query engine.
///
/// Understands the query forms the todo store emits: `*`, `@field:(words)`,
/// `@field:"phrase"` and `@field:word`, with clauses separated by spaces and
/// combined with AND. Matching is on whole lowercase words; a clause with no
/// words, such as `@name:(\!\!)`, matches nothing.
#[derive(Clone, Default)]
pub struct MemoryDocumentClient {
    state: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<String, Value>,
    indexes: HashMap<String, IndexDefinition>,
}

impl MemoryDocumentClient {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl DocumentClient for MemoryDocumentClient {
    async fn index_info(&self, index: &str) -> Result<(), ClientError> {
        let state = self.state.read().await;
        if state.indexes.contains_key(index) { Ok(()) } else { Err(ClientError::UnknownIndex(index.to_string())) }
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        if state.indexes.contains_key(index) {
            return Err(ClientError::Backend("Index already exists".into()));
        }
        state.indexes.insert(index.to_string(), definition.clone());
        Ok(())
    }

    async fn drop_index(&self, index: &str) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        match state.indexes.remove(index) {
            Some(_) => Ok(()),
            None => Err(ClientError::UnknownIndex(index.to_string())),
        }
    }

    async fn json_get(&self, key: &str) -> Result<Option<Value>, ClientError> {
        Ok(self.state.read().await.documents.get(key).cloned())
    }

    async fn json_set(&self, key: &str, document: &Value) -> Result<bool, ClientError> {
        self.state.write().await.documents.insert(key.to_string(), document.clone());
        Ok(true)
    }

    async fn json_del(&self, key: &str) -> Result<u64, ClientError> {
        Ok(u64::from(self.state.write().await.documents.remove(key).is_some()))
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResult, ClientError> {
        let state = self.state.read().await;
        let definition = state.indexes.get(index).ok_or_else(|| ClientError::UnknownIndex(index.to_string()))?;
        let clauses = parse_query(&query.query)?;
        for clause in &clauses {
            if !definition.fields.iter().any(|f| f.alias == clause.field) {
                return Err(ClientError::Backend(format!("Unknown field `{}`", clause.field)));
            }
        }

        let matches = state
            .documents
            .iter()
            .filter(|(key, _)| definition.prefixes.iter().any(|p| key.starts_with(p.as_str())))
            .filter(|(_, doc)| clauses.iter().all(|clause| clause.matches(definition, doc)));

        let mut documents = Vec::new();
        let mut total = 0u64;
        for (position, (key, doc)) in matches.enumerate() {
            total += 1;
            if position >= query.offset && documents.len() < query.limit {
                documents.push(RawDocument { id: key.clone(), json: doc.clone() });
            }
        }
        Ok(SearchResult { total, documents })
    }
}

#[derive(Debug, PartialEq)]
enum Terms {
    /// Every word must appear.
    All(Vec<String>),
    /// The words must appear consecutively.
    Phrase(Vec<String>),
}

#[derive(Debug, PartialEq)]
struct Clause {
    field: String,
    terms: Terms,
}

impl Clause {
    fn matches(&self, definition: &IndexDefinition, doc: &Value) -> bool {
        let Some(field) = definition.fields.iter().find(|f| f.alias == self.field) else { return false };
        let Some(text) = project(doc, &field.path) else { return false };
        let words = tokenize(&text);
        match &self.terms {
            Terms::All(terms) => !terms.is_empty() && terms.iter().all(|t| words.contains(t)),
            Terms::Phrase(terms) => !terms.is_empty() && words.windows(terms.len()).any(|w| w == terms.as_slice()),
        }
    }
}

/// Resolves a `$.a.b` path against a document and renders the value as text.
fn project(doc: &Value, path: &str) -> Option<String> {
    let mut current = doc;
    for segment in path.trim_start_matches('$').split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn parse_query(query: &str) -> Result<Vec<Clause>, ClientError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ClientError::Backend("Syntax error: empty query".into()));
    }
    if query == "*" {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = query.chars().collect();
    let mut clauses = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        if chars[i] != '@' {
            return Err(ClientError::Backend(format!("Syntax error at offset {i} near `{}`", chars[i])));
        }
        i += 1;

        let start = i;
        while i < chars.len() && chars[i] != ':' {
            i += 1;
        }
        if i == chars.len() {
            return Err(ClientError::Backend("Syntax error: expected `:` after field name".into()));
        }
        let field: String = chars[start..i].iter().collect();
        i += 1;

        let (raw, phrase) = match chars.get(i) {
            Some('(') => (read_until(&chars, &mut i, ')')?, false),
            Some('"') => (read_until(&chars, &mut i, '"')?, true),
            _ => {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                (unescape(&chars[start..i]), false)
            }
        };

        let words = tokenize(&raw);
        let terms = if phrase { Terms::Phrase(words) } else { Terms::All(words) };
        clauses.push(Clause { field, terms });
    }
    Ok(clauses)
}

/// Reads a delimited group starting at the opening character at `chars[*i]`,
/// honoring backslash escapes. Leaves `*i` after the closing delimiter.
fn read_until(chars: &[char], i: &mut usize, close: char) -> Result<String, ClientError> {
    *i += 1;
    let start = *i;
    while *i < chars.len() {
        match chars[*i] {
            '\\' => *i += 2,
            c if c == close => {
                let group = unescape(&chars[start..*i]);
                *i += 1;
                return Ok(group);
            }
            _ => *i += 1,
        }
    }
    Err(ClientError::Backend(format!("Syntax error: missing `{close}`")))
}

/// Drops escape backslashes. Escaped punctuation separates words.
fn unescape(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut escaped = false;
    for &c in chars {
        if c == '\\' && !escaped {
            escaped = true;
            continue;
        }
        if escaped && !(c.is_alphanumeric() || c == '_') {
            out.push(' ');
        } else {
            out.push(c);
        }
        escaped = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document_client::{IndexOn, TextField};
    use serde_json::json;

    fn definition() -> IndexDefinition {
        IndexDefinition {
            on: IndexOn::Json,
            prefixes: vec!["todos:".into()],
            fields: vec![TextField::new("$.name", "name"), TextField::new("$.status", "status")],
            keep_stopwords: true,
        }
    }

    async fn seeded() -> MemoryDocumentClient {
        let client = MemoryDocumentClient::new();
        client.create_index("idx", &definition()).await.unwrap();
        client.json_set("todos:1", &json!({ "name": "Take out the trash", "status": "todo" })).await.unwrap();
        client.json_set("todos:2", &json!({ "name": "Vacuum downstairs", "status": "in progress" })).await.unwrap();
        client.json_set("todos:3", &json!({ "name": "Take the dog out", "status": "complete" })).await.unwrap();
        client.json_set("other:1", &json!({ "name": "Take a nap", "status": "todo" })).await.unwrap();
        client
    }

    async fn ids(client: &MemoryDocumentClient, query: &str) -> Vec<String> {
        let query = SearchQuery { query: query.into(), offset: 0, limit: 100 };
        client.search("idx", &query).await.unwrap().documents.into_iter().map(|d| d.id).collect()
    }

    #[tokio::test]
    async fn star_matches_only_prefixed_documents() {
        let client = seeded().await;
        assert_eq!(ids(&client, "*").await, vec!["todos:1", "todos:2", "todos:3"]);
    }

    #[tokio::test]
    async fn grouped_words_and_phrases() {
        let client = seeded().await;
        assert_eq!(ids(&client, "@name:(take out)").await, vec!["todos:1", "todos:3"]);
        assert_eq!(ids(&client, "@status:\"in progress\"").await, vec!["todos:2"]);
        assert_eq!(ids(&client, "@name:(take) @status:\"complete\"").await, vec!["todos:3"]);
        assert!(ids(&client, "@status:\"progress in\"").await.is_empty());
    }

    #[tokio::test]
    async fn escaped_punctuation_separates_words() {
        let client = seeded().await;
        assert_eq!(ids(&client, "@name:(dog\\-out)").await, vec!["todos:3"]);
    }

    #[tokio::test]
    async fn clause_without_words_matches_nothing() {
        let client = seeded().await;
        assert!(ids(&client, "@name:(\\!\\!\\!)").await.is_empty());
        assert!(ids(&client, "@status:\"\"").await.is_empty());
    }

    #[tokio::test]
    async fn limit_caps_documents_but_not_total() {
        let client = seeded().await;
        let result = client.search("idx", &SearchQuery { query: "*".into(), offset: 0, limit: 2 }).await.unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.documents.len(), 2);
    }

    #[tokio::test]
    async fn rejects_empty_query_and_unknown_fields() {
        let client = seeded().await;
        let empty = SearchQuery { query: "".into(), offset: 0, limit: 10 };
        assert!(matches!(client.search("idx", &empty).await, Err(ClientError::Backend(_))));
        let unknown = SearchQuery { query: "@owner:(bob)".into(), offset: 0, limit: 10 };
        assert!(matches!(client.search("idx", &unknown).await, Err(ClientError::Backend(_))));
    }

    #[tokio::test]
    async fn index_lifecycle_and_missing_keys() {
        let client = MemoryDocumentClient::new();
        assert_eq!(client.index_info("idx").await, Err(ClientError::UnknownIndex("idx".into())));
        client.create_index("idx", &definition()).await.unwrap();
        assert!(client.create_index("idx", &definition()).await.is_err());
        client.index_info("idx").await.unwrap();
        client.drop_index("idx").await.unwrap();
        assert!(client.index_info("idx").await.is_err());

        assert_eq!(client.json_get("todos:nope").await.unwrap(), None);
        assert_eq!(client.json_del("todos:nope").await.unwrap(), 0);
    }
}
