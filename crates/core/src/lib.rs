pub mod aggregate;
pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod ids;
pub mod model;
pub mod query;
pub mod time;

pub use error::{Result, TracegraphError};
