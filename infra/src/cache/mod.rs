//! Cache module for the Redis-backed token store
//!
//! Provides the Redis client (connection, retry logic, basic commands) and
//! the revocation/rotation store built on top of it.

pub mod redis_client;
pub mod token_store;

#[cfg(test)]
mod tests;

pub use redis_client::RedisClient;
pub use token_store::RedisTokenStore;

// Re-export commonly used types
pub use tk_shared::config::cache::CacheConfig;
