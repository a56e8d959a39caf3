pub mod api;
pub mod api_doc;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod publisher;
pub mod server;
pub mod ws;

pub use server::run_server;
