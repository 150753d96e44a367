pub mod committer;
pub mod context;
pub mod sqlite;
pub mod store;
pub mod topics;
pub mod trend;

pub use committer::MemoryCommitter;
pub use context::MemoryContextBuilder;
pub use sqlite::SqliteStore;
pub use store::InMemoryStore;
pub use topics::{TopicExtractor, TopicHit};
pub use trend::{TrendSentiment, TrendTracker};
