pub mod builder;
pub mod db;
pub mod gateway;
pub mod predicate;
pub mod purge;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod write;

pub use db::Store;
pub use gateway::Gateway;
pub use resolver::Resolver;
