//! DuckDB persistence: identifier rules, statement builders, the store
//! connection, and the two components allowed to change stored data.

pub mod column;
pub mod identifier;
pub mod resolver;
pub mod schema;
pub mod statement;
pub mod store;
