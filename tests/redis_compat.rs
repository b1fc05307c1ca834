//! Runs against a live Redis Stack (RedisJSON + RediSearch).
//!
//! `REDIS_URL=redis://localhost:6379 cargo test --test redis_compat -- --ignored --test-threads=1`
//!
//! The tests drop and recreate `todos-idx` and delete every `todos:*`
//! document, so never point them at a database holding real data.

use std::sync::Arc;
use std::time::Duration;

use todos_api::{
    application::todo_store::TodoStore,
    domain::todo::TodoStatus,
    infrastructure::redis_client::{RedisDocumentClient, RedisSettings},
};

async fn store() -> TodoStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let settings = RedisSettings { retry_attempts: 2, health_check_interval: None, ..RedisSettings::default() };
    let client = RedisDocumentClient::connect(&url, &settings).await.expect("redis stack reachable at REDIS_URL");
    let store = TodoStore::new(Arc::new(client));
    store.initialize().await.unwrap();
    store.delete_all().await.unwrap();
    store.drop_index().await.unwrap();
    store
}

/// RediSearch indexes JSON documents asynchronously.
async fn settle() { tokio::time::sleep(Duration::from_millis(200)).await; }

#[tokio::test]
#[ignore]
async fn index_lifecycle_against_redis() {
    let todos = store().await;
    assert!(!todos.have_index().await.unwrap());
    todos.initialize().await.unwrap();
    assert!(todos.have_index().await.unwrap());
    todos.drop_index().await.unwrap();
    assert!(!todos.have_index().await.unwrap());
}

#[tokio::test]
#[ignore]
async fn crud_and_search_against_redis() {
    let todos = store().await;
    todos.initialize().await.unwrap();

    let trash = todos.create(None, Some("Take out the trash")).await.unwrap();
    todos.create(Some("dog"), Some("Walk the dog")).await.unwrap();
    todos.update("dog", TodoStatus::InProgress).await.unwrap();
    settle().await;

    let all = todos.all().await.unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(todos.search(None, None).await.unwrap().total, all.total);

    let by_status = todos.search(None, Some(TodoStatus::InProgress)).await.unwrap();
    assert_eq!(by_status.total, 1);
    assert_eq!(by_status.documents[0].id, "todos:dog");

    let by_name = todos.search(Some("trash"), None).await.unwrap();
    assert_eq!(by_name.documents[0].id, trash.id);

    assert!(todos.one("missing").await.unwrap_err().is_not_found());
    todos.delete("dog").await.unwrap();
    todos.delete("dog").await.unwrap();

    todos.delete_all().await.unwrap();
    settle().await;
    assert_eq!(todos.all().await.unwrap().total, 0);
    todos.drop_index().await.unwrap();
}
