//! Concrete [`Backend`](super::Backend) implementations.

mod memory;
mod mongo;
mod redis;

pub use memory::{MemoryBackend, MemoryStore};
pub use mongo::{MongoBackend, MongoStore};
pub use redis::{RedisBackend, RedisStore};
