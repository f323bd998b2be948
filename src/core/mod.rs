//! Engine core: per-index shard lifecycle and the process-wide registry.

pub mod index;
pub mod registry;

pub use index::{Index, IndexDescriptor, IndexSettings, Shard, ShardMeta};
pub use registry::Registry;
