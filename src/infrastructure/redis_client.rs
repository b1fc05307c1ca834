use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Cmd, RedisError, Value as RedisValue};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::retry::{reconnect_factor_ms, RetryPolicy};
use crate::domain::document_client::{ClientError, DocumentClient, IndexDefinition, IndexOn, RawDocument, SearchQuery, SearchResult};

/// Connection and retry policy for the Redis client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub retry_attempts: usize,
    /// First retry or reconnect delay; later delays double up to `retry_max_delay`.
    pub retry_base: Duration,
    pub retry_max_delay: Duration,
    pub response_timeout: Duration,
    pub connection_timeout: Duration,
    /// `None` disables the background PING.
    pub health_check_interval: Option<Duration>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 25,
            retry_base: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
            response_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(5),
            health_check_interval: Some(Duration::from_secs(1)),
        }
    }
}

impl RedisSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { attempts: self.retry_attempts, base: self.retry_base, max_delay: self.retry_max_delay }
    }
}

/// Redis Stack (RedisJSON + RediSearch) backend.
///
/// Reconnects with exponential backoff on connection loss. A command that
/// fails with a dropped connection or a timeout is retried on the same
/// backoff schedule.
#[derive(Clone)]
pub struct RedisDocumentClient {
    manager: ConnectionManager,
    retry: RetryPolicy,
    _health_check: Option<Arc<HealthCheck>>,
}

impl RedisDocumentClient {
    pub async fn connect(url: &str, settings: &RedisSettings) -> Result<Self, ClientError> {
        let client = Client::open(url).map_err(classify)?;
        let addr = client.get_connection_info().addr.to_string();

        let config = ConnectionManagerConfig::new()
            .set_exponent_base(2)
            .set_factor(reconnect_factor_ms(settings.retry_base))
            .set_max_delay(millis(settings.retry_max_delay))
            .set_number_of_retries(settings.retry_attempts)
            .set_response_timeout(settings.response_timeout)
            .set_connection_timeout(settings.connection_timeout);
        let manager = ConnectionManager::new_with_config(client, config).await.map_err(classify)?;
        tracing::info!(%addr, "connected to redis");

        let health_check = settings
            .health_check_interval
            .map(|every| Arc::new(HealthCheck::spawn(manager.clone(), every)));
        Ok(Self { manager, retry: settings.retry_policy(), _health_check: health_check })
    }

    async fn query(&self, cmd: &Cmd) -> Result<RedisValue, RedisError> {
        let mut retries = 0;
        loop {
            let mut conn = self.manager.clone();
            match cmd.query_async(&mut conn).await {
                Err(err) if is_transient(&err) && self.retry.should_retry(retries) => {
                    retries += 1;
                    let delay = self.retry.delay_for_retry(retries);
                    tracing::warn!(error = %err, retry = retries, ?delay, "redis command failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl DocumentClient for RedisDocumentClient {
    async fn index_info(&self, index: &str) -> Result<(), ClientError> {
        self.query(redis::cmd("FT.INFO").arg(index)).await.map_err(index_error(index))?;
        Ok(())
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<(), ClientError> {
        self.query(&create_index_command(index, definition)).await.map_err(classify)?;
        Ok(())
    }

    async fn drop_index(&self, index: &str) -> Result<(), ClientError> {
        self.query(redis::cmd("FT.DROPINDEX").arg(index)).await.map_err(index_error(index))?;
        Ok(())
    }

    async fn json_get(&self, key: &str) -> Result<Option<Value>, ClientError> {
        let reply = self.query(redis::cmd("JSON.GET").arg(key)).await.map_err(classify)?;
        let raw: Option<String> = redis::from_redis_value(&reply).map_err(|e| ClientError::protocol(e.to_string()))?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(|e| ClientError::protocol(format!("JSON.GET {key}: {e}"))))
            .transpose()
    }

    async fn json_set(&self, key: &str, document: &Value) -> Result<bool, ClientError> {
        let reply = self
            .query(redis::cmd("JSON.SET").arg(key).arg("$").arg(document.to_string()))
            .await
            .map_err(classify)?;
        Ok(is_ok_reply(&reply))
    }

    async fn json_del(&self, key: &str) -> Result<u64, ClientError> {
        let reply = self.query(redis::cmd("JSON.DEL").arg(key)).await.map_err(classify)?;
        redis::from_redis_value(&reply).map_err(|e| ClientError::protocol(e.to_string()))
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResult, ClientError> {
        let cmd = redis::cmd("FT.SEARCH")
            .arg(index)
            .arg(&query.query)
            .arg("LIMIT")
            .arg(query.offset)
            .arg(query.limit)
            .clone();
        let reply = self.query(&cmd).await.map_err(index_error(index))?;
        parse_search_reply(reply)
    }
}

struct HealthCheck(JoinHandle<()>);

impl HealthCheck {
    fn spawn(mut manager: ConnectionManager, every: Duration) -> Self {
        Self(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pong: Result<RedisValue, RedisError> = redis::cmd("PING").query_async(&mut manager).await;
                if let Err(err) = pong {
                    tracing::warn!(error = %err, "redis health check failed");
                }
            }
        }))
    }
}

impl Drop for HealthCheck {
    fn drop(&mut self) { self.0.abort(); }
}

fn millis(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }

/// True when a RediSearch error says the index does not exist.
///
/// RediSearch replies `Unknown index name` (older releases capitalize
/// `Index`), and recent Redis versions reply `<index>: no such index`. The
/// client renders unrecognized error codes as `<code>: <detail>`, so colons
/// are ignored when comparing.
pub fn is_unknown_index(message: &str) -> bool {
    let normalized = message.replace(':', " ").to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    normalized.contains("unknown index name") || normalized.contains("no such index")
}

fn index_error(index: &str) -> impl FnOnce(RedisError) -> ClientError + '_ {
    move |err| {
        if is_unknown_index(&err.to_string()) { ClientError::UnknownIndex(index.to_string()) } else { classify(err) }
    }
}

fn is_transient(err: &RedisError) -> bool {
    err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error()
}

fn classify(err: RedisError) -> ClientError {
    if is_transient(&err) {
        ClientError::Unavailable(err.to_string())
    } else {
        ClientError::Backend(err.to_string())
    }
}

fn is_ok_reply(reply: &RedisValue) -> bool {
    match reply {
        RedisValue::Okay => true,
        RedisValue::SimpleString(s) => s == "OK",
        _ => false,
    }
}

/// `FT.CREATE <index> ON JSON PREFIX n <prefix>.. [STOPWORDS 0] SCHEMA <path> AS <alias> TEXT ..`
pub fn create_index_command(index: &str, definition: &IndexDefinition) -> Cmd {
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(index).arg("ON").arg(match definition.on {
        IndexOn::Json => "JSON",
    });
    cmd.arg("PREFIX").arg(definition.prefixes.len()).arg(&definition.prefixes);
    if definition.keep_stopwords {
        cmd.arg("STOPWORDS").arg(0);
    }
    cmd.arg("SCHEMA");
    for field in &definition.fields {
        cmd.arg(&field.path).arg("AS").arg(&field.alias).arg("TEXT");
    }
    cmd
}

/// Decodes `[total, key, [field, value, ..], key, [..], ..]` where the JSON
/// body of each hit is the value of the `$` field.
pub fn parse_search_reply(reply: RedisValue) -> Result<SearchResult, ClientError> {
    let RedisValue::Array(items) = reply else {
        return Err(ClientError::protocol(format!("FT.SEARCH: expected array, got {reply:?}")));
    };
    let mut items = items.into_iter();
    let total = match items.next() {
        Some(RedisValue::Int(n)) => u64::try_from(n).map_err(|_| ClientError::protocol(format!("FT.SEARCH: negative total {n}")))?,
        other => return Err(ClientError::protocol(format!("FT.SEARCH: expected total, got {other:?}"))),
    };

    let mut documents = Vec::new();
    while let Some(key) = items.next() {
        let id: String = redis::from_redis_value(&key).map_err(|e| ClientError::protocol(format!("FT.SEARCH key: {e}")))?;
        let fields = items.next().ok_or_else(|| ClientError::protocol(format!("FT.SEARCH: no fields for {id}")))?;
        let json = document_body(&id, &fields)?;
        documents.push(RawDocument { id, json });
    }
    Ok(SearchResult { total, documents })
}

fn document_body(id: &str, fields: &RedisValue) -> Result<Value, ClientError> {
    let RedisValue::Array(fields) = fields else {
        return Err(ClientError::protocol(format!("FT.SEARCH: fields of {id} are not an array")));
    };
    for pair in fields.chunks(2) {
        let [name, value] = pair else { break };
        let name: String = redis::from_redis_value(name).map_err(|e| ClientError::protocol(e.to_string()))?;
        if name == "$" {
            let raw: String = redis::from_redis_value(value).map_err(|e| ClientError::protocol(e.to_string()))?;
            return serde_json::from_str(&raw).map_err(|e| ClientError::protocol(format!("FT.SEARCH {id}: {e}")));
        }
    }
    Err(ClientError::protocol(format!("FT.SEARCH: {id} has no `$` field")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document_client::TextField;
    use serde_json::json;

    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{tcp::OwnedReadHalf, TcpListener};

    fn bulk(s: &str) -> RedisValue { RedisValue::BulkString(s.as_bytes().to_vec()) }

    async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0; len + 2];
            reader.read_exact(&mut buf).await.ok()?;
            buf.truncate(len);
            args.push(String::from_utf8_lossy(&buf).into_owned());
        }
        Some(args)
    }

    /// RESP server that closes the first connection to send `JSON.DEL` and
    /// answers `:1` to it afterwards. Everything else gets `+OK`.
    async fn server_dropping_first_delete() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("redis://{}", listener.local_addr().unwrap());
        let dropped = Arc::new(AtomicBool::new(false));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let dropped = dropped.clone();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    while let Some(args) = read_command(&mut reader).await {
                        let reply: &[u8] = match args.first().map(|c| c.to_ascii_uppercase()).as_deref() {
                            Some("JSON.DEL") if !dropped.swap(true, Ordering::SeqCst) => return,
                            Some("JSON.DEL") => b":1\r\n",
                            _ => b"+OK\r\n",
                        };
                        if write.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        url
    }

    fn fast_retries(attempts: usize) -> RedisSettings {
        RedisSettings {
            retry_attempts: attempts,
            retry_base: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(50),
            response_timeout: Duration::from_secs(2),
            connection_timeout: Duration::from_secs(2),
            health_check_interval: None,
        }
    }

    #[tokio::test]
    async fn retries_command_after_dropped_connection() {
        let url = server_dropping_first_delete().await;
        let client = RedisDocumentClient::connect(&url, &fast_retries(5)).await.unwrap();
        assert_eq!(client.json_del("todos:x").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_connection_without_retries_is_unavailable() {
        let url = server_dropping_first_delete().await;
        let client = RedisDocumentClient::connect(&url, &fast_retries(0)).await.unwrap();
        assert!(matches!(client.json_del("todos:x").await, Err(ClientError::Unavailable(_))));
    }

    #[test]
    fn recognizes_unknown_index_replies() {
        assert!(is_unknown_index("Unknown index name"));
        assert!(is_unknown_index("Unknown Index name"));
        assert!(is_unknown_index("Unknown: Index name"));
        assert!(is_unknown_index("todos-idx: no such index"));
        assert!(!is_unknown_index("Index already exists"));
        assert!(!is_unknown_index("Connection refused (os error 111)"));
    }

    #[test]
    fn builds_json_index_command() {
        let definition = IndexDefinition {
            on: IndexOn::Json,
            prefixes: vec!["todos:".into()],
            fields: vec![TextField::new("$.name", "name"), TextField::new("$.status", "status")],
            keep_stopwords: true,
        };
        let args: Vec<String> = create_index_command("todos-idx", &definition)
            .args_iter()
            .map(|arg| match arg {
                redis::Arg::Simple(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                redis::Arg::Cursor => "<cursor>".to_string(),
            })
            .collect();
        assert_eq!(
            args.join(" "),
            "FT.CREATE todos-idx ON JSON PREFIX 1 todos: STOPWORDS 0 SCHEMA $.name AS name TEXT $.status AS status TEXT"
        );
    }

    #[test]
    fn parses_search_reply() {
        let reply = RedisValue::Array(vec![
            RedisValue::Int(2),
            bulk("todos:a"),
            RedisValue::Array(vec![bulk("$"), bulk(r#"{"name":"Fold the laundry","status":"todo"}"#)]),
            bulk("todos:b"),
            RedisValue::Array(vec![bulk("$"), bulk(r#"{"name":"Vacuum","status":"complete"}"#)]),
        ]);
        let result = parse_search_reply(reply).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.documents[0].id, "todos:a");
        assert_eq!(result.documents[1].json, json!({ "name": "Vacuum", "status": "complete" }));
    }

    #[test]
    fn rejects_hits_without_json_body() {
        let reply = RedisValue::Array(vec![RedisValue::Int(1), bulk("todos:a"), RedisValue::Array(vec![bulk("name"), bulk("x")])]);
        assert!(matches!(parse_search_reply(reply), Err(ClientError::Protocol(_))));
        assert!(matches!(parse_search_reply(RedisValue::Nil), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn only_ok_counts_as_stored() {
        assert!(is_ok_reply(&RedisValue::Okay));
        assert!(is_ok_reply(&RedisValue::SimpleString("OK".into())));
        assert!(!is_ok_reply(&RedisValue::Nil));
    }
}
