// Database layer module: PostgreSQL connection pool and embedded migrations

pub mod pool;

pub use pool::DbPool;
