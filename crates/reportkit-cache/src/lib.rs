pub mod error;
mod generations;
mod manager;
mod store;

pub use error::{Error, Result};
pub use generations::{GLOBAL_KEY, Generations};
pub use manager::{CacheManager, DummyCacheManager, GenerationCacheManager, KeyInput, digest};
pub use store::{CacheStore, CacheValue, MemoryStore, NullStore, SqliteStore};
