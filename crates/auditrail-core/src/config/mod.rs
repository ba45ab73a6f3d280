pub mod rollover;
pub mod writer;

pub use rollover::{RolloverConfig, RolloverPolicy};
pub use writer::{DestinationConfig, StorageConfig, WriterConfig};
