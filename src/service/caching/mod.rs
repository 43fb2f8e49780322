pub mod collections;
pub mod keys;
pub mod memory;
pub mod redis;
pub mod store;

pub use self::memory::MemoryCache;
pub use self::redis::{CacheError, RedisCache};
pub use self::store::Cache;
