pub mod memory_client;
pub mod redis_client;
pub mod registry;
pub mod retry;
