pub mod config;
pub mod kafka;
pub mod model;
pub mod query;
pub mod schema;
pub mod stream;
pub mod table;
