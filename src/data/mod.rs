pub mod batch;
pub mod loader;
pub mod synthetic;

pub use batch::{Batch, Sample};
pub use loader::{random_split, BatchLoader, InMemoryLoader};
pub use synthetic::SyntheticVolumes;
