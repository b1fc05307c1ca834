use axum::{extract::{Path, Query, State}, routing::get, Json, Router};
use http::StatusCode;
use serde::Deserialize;

use crate::{
    application::todo_service::TodoService,
    domain::todo::{CreateTodo, Todo, TodoDocument, TodoStatus, Todos, UpdateTodo},
    http::types::ApiError,
};

#[derive(Clone)]
pub struct AppState<S: TodoService> { pub service: S }

pub fn router<S: TodoService + Clone + Send + Sync + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(all_todos::<S>).post(create_todo::<S>))
        .route("/search", get(search_todos::<S>))
        .route("/:id", get(get_todo::<S>).patch(update_todo::<S>).delete(delete_todo::<S>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub name: Option<String>,
    pub status: Option<TodoStatus>,
}

async fn all_todos<S: TodoService>(State(state): State<AppState<S>>) -> Result<Json<Todos>, ApiError> {
    Ok(Json(state.service.all().await?))
}

async fn search_todos<S: TodoService>(State(state): State<AppState<S>>, Query(params): Query<SearchParams>) -> Result<Json<Todos>, ApiError> {
    Ok(Json(state.service.search(params.name, params.status).await?))
}

async fn get_todo<S: TodoService>(State(state): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Todo>, ApiError> {
    Ok(Json(state.service.one(&id).await?))
}

async fn create_todo<S: TodoService>(State(state): State<AppState<S>>, Json(payload): Json<CreateTodo>) -> Result<Json<TodoDocument>, ApiError> {
    // A missing name is rejected by the store itself.
    if payload.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    Ok(Json(state.service.create(payload).await?))
}

async fn update_todo<S: TodoService>(State(state): State<AppState<S>>, Path(id): Path<String>, Json(payload): Json<UpdateTodo>) -> Result<Json<Todo>, ApiError> {
    Ok(Json(state.service.update(&id, payload).await?))
}

async fn delete_todo<S: TodoService>(State(state): State<AppState<S>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
