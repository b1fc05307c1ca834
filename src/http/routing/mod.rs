pub mod todos;

use axum::{routing::get, Router};

pub const TODOS_PATH: &str = "/api/todos";

pub fn app(todos: Router) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest(TODOS_PATH, todos)
}
