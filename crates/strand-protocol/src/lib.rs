//! Canonical protocol types for Strand agent sessions.
//!
//! This crate defines the formats shared by every stage of the streaming
//! augmentation pipeline and by the transports that forward its output:
//!
//! ```text
//! Agent (claude, pi, ...) --[provider JSONL]--> Normalizer --[CanonicalMessage]--> Detector
//!                                                                                    |
//! Browser <--[SSE / WS: StreamEvent]-- Augmenter <--[CompletedBlock + Augment]-- Coordinator
//! ```
//!
//! ## Design Principles
//!
//! 1. **Messages are ephemeral input.** A `CanonicalMessage` is consumed once by the
//!    block detector and then discarded.
//! 2. **Blocks are finalized once.** A `CompletedBlock` is produced at most once per
//!    block id, and its `Augment` is computed at most once.
//! 3. **Events are totally ordered per session.** The transport forwards `StreamEvent`s
//!    verbatim; it never reorders or merges them.
//! 4. **Agent-agnostic.** Nothing here knows which agent harness produced the stream.

pub mod augments;
pub mod blocks;
pub mod events;
pub mod messages;

pub use augments::{Augment, PlanSummary};
pub use blocks::{BlockId, BlockKind, CompletedBlock, DegradeReason, Finalization, ToolCall, ToolOutcome};
pub use events::{ControlKind, Envelope, StreamEvent};
pub use messages::{CanonicalMessage, ContentPart, Role};
