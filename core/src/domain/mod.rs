//! Domain layer: the claim set and the values handed back to callers.

pub mod entities;

pub use entities::*;
