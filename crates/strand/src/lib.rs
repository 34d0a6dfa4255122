//! Strand: streaming augmentation for browser-driven coding agent sessions.
//!
//! A session pipeline takes the JSONL an agent process writes, normalizes it
//! into canonical messages, detects block boundaries incrementally, computes
//! rendering augments (diffs, highlighted files, plan summaries) off the async
//! runtime, and yields an ordered stream of events ready for SSE or WebSocket
//! delivery.
//!
//! ```no_run
//! use futures::StreamExt;
//! use strand::{PipelineConfig, ProviderFamily, StreamAugmenter, source};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let reader = source::open_input("session.jsonl".as_ref()).await?;
//! let input = source::provider_messages(reader, ProviderFamily::Claude);
//! let events = StreamAugmenter::new("ses_1", PipelineConfig::default())?
//!     .run(input, CancellationToken::new());
//! futures::pin_mut!(events);
//! while let Some(event) = events.next().await {
//!     print!("{}", strand::wire::sse_frame(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod augment;
pub mod blocks;
pub mod canon;
pub mod config;
pub mod hub;
pub mod source;
pub mod stream;
pub mod telemetry;
pub mod wire;

pub use canon::{Normalizer, ProviderFamily, ProviderMessage};
pub use config::{ConfigError, PipelineConfig};
pub use hub::{HubError, SessionHub};
pub use stream::{BlockIndex, StreamAugmenter, StreamCoordinator};
pub use telemetry::{SessionTelemetry, TelemetrySnapshot};

pub use strand_protocol as protocol;
