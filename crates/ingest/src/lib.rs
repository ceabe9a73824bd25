pub mod http;
pub mod server;

pub use http::IngestLimits;
pub use server::run_ingest_server;
