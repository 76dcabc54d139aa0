// SQLite persistence layer
// Owns the only direct access to the storage engine; every read is
// tenant-scoped at the SQL level

mod db;
mod error;
mod queries;
mod schema;

pub use db::Database;
pub use error::{Error, Result};
pub use queries::chunks::{ChunkFilters, RankedChunk};
pub use queries::decisions::DecisionFilters;
