pub mod error;
pub mod todo_service;
pub mod todo_store;
