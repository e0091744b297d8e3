mod backends;
mod connection;
mod schema;
mod traits;

pub mod repository;

pub use backends::LibSqlBackend;
pub use connection::Database;
pub use schema::init_schema;
pub use traits::*;
