mod libsql;
mod traits;

pub use libsql::LibSqlVectorStore;
pub use traits::{CollectionStats, VectorMatch, VectorRecord, VectorStore};
