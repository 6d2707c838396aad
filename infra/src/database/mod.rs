//! Database module - MySQL implementations using SQLx
//!
//! - Connection pool management
//! - Revocation/rotation store on two keyed tables

pub mod connection;
pub mod mysql;


// Re-export commonly used types
pub use connection::{DatabasePool, PoolStatistics};
pub use mysql::MySqlTokenStore;
