use async_trait::async_trait;

use super::{error::StoreError, todo_store::TodoStore};
use crate::domain::todo::{CreateTodo, Todo, TodoDocument, TodoStatus, Todos, UpdateTodo};

/// The operations the HTTP layer needs from the todo store.
#[async_trait]
pub trait TodoService: Send + Sync + 'static {
    async fn initialize(&self) -> Result<(), StoreError>;
    async fn all(&self) -> Result<Todos, StoreError>;
    async fn search(&self, name: Option<String>, status: Option<TodoStatus>) -> Result<Todos, StoreError>;
    async fn one(&self, id: &str) -> Result<Todo, StoreError>;
    async fn create(&self, input: CreateTodo) -> Result<TodoDocument, StoreError>;
    async fn update(&self, id: &str, input: UpdateTodo) -> Result<Todo, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl TodoService for TodoStore {
    async fn initialize(&self) -> Result<(), StoreError> { TodoStore::initialize(self).await }
    async fn all(&self) -> Result<Todos, StoreError> { TodoStore::all(self).await }
    async fn search(&self, name: Option<String>, status: Option<TodoStatus>) -> Result<Todos, StoreError> {
        TodoStore::search(self, name.as_deref(), status).await
    }
    async fn one(&self, id: &str) -> Result<Todo, StoreError> { TodoStore::one(self, id).await }
    async fn create(&self, input: CreateTodo) -> Result<TodoDocument, StoreError> {
        TodoStore::create(self, input.id.as_deref(), input.name.as_deref()).await
    }
    async fn update(&self, id: &str, input: UpdateTodo) -> Result<Todo, StoreError> {
        TodoStore::update(self, id, input.status).await
    }
    async fn delete(&self, id: &str) -> Result<(), StoreError> { TodoStore::delete(self, id).await }
}
