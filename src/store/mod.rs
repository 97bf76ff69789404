//! Persistence and repository access.

pub mod local;
pub mod memory;
pub mod traits;

pub use local::LocalWorkspace;
pub use memory::InMemoryStore;
pub use traits::{RepositoryFiles, TaskStore};
