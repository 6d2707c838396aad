pub mod token;

pub use token::{MemoryTokenStore, RevocationStore, RotationStore};

#[cfg(test)]
pub use token::MockTokenStore;
