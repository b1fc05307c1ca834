pub mod clock;
pub mod document_client;
pub mod todo;
