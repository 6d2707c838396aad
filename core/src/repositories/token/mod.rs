pub mod r#trait {
    pub use super::trait_::*;
}
#[path = "trait.rs"]
mod trait_;
pub mod memory;

pub use memory::MemoryTokenStore;
pub use r#trait::{RevocationStore, RotationStore};

#[cfg(test)]
pub mod mock;
#[cfg(test)]
pub use mock::MockTokenStore;
