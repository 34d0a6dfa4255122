//! Block detection: deciding when streamed content is done.

mod detector;
pub mod fence;

pub use detector::{BlockDetector, Detected};
