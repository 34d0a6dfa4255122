//! Per-session streaming: ordered augment dispatch and event emission.

mod augmenter;
mod coalesce;
mod coordinator;
pub mod index;
mod snapshots;

pub use augmenter::{CLOSED_MID_TURN, StreamAugmenter};
pub use coalesce::Coalescer;
pub use coordinator::{Output, StreamCoordinator};
pub use index::{BlockIndex, IndexedBlock, MemoryIndex, NoopIndex};
pub use snapshots::FileSnapshots;
