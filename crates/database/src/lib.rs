pub mod basic_db;

pub use basic_db::{Batch, DbError, InnerDatabase, SafeDatabase};
