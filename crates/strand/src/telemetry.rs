//! Per-pipeline telemetry: a tracing span plus counters.
//!
//! Each session pipeline owns one `SessionTelemetry`; there are no process-wide
//! registries. Clones share the same counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use strand_protocol::{Augment, CompletedBlock};
use tracing::Span;

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    blocks: AtomicU64,
    degraded_blocks: AtomicU64,
    augments: AtomicU64,
    plain_augments: AtomicU64,
    pending_events: AtomicU64,
    events: AtomicU64,
}

/// Point-in-time copy of a pipeline's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub messages: u64,
    pub blocks: u64,
    pub degraded_blocks: u64,
    pub augments: u64,
    pub plain_augments: u64,
    pub pending_events: u64,
    pub events: u64,
}

#[derive(Debug, Clone)]
pub struct SessionTelemetry {
    span: Span,
    counters: Arc<Counters>,
}

impl SessionTelemetry {
    pub fn new(session_id: &str) -> Self {
        Self {
            span: tracing::info_span!("session", session_id = %session_id),
            counters: Arc::default(),
        }
    }

    /// Telemetry that records counters but belongs to no span.
    pub fn detached() -> Self {
        Self {
            span: Span::none(),
            counters: Arc::default(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_message(&self) {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block(&self, block: &CompletedBlock) {
        self.counters.blocks.fetch_add(1, Ordering::Relaxed);
        if block.is_degraded() {
            self.counters.degraded_blocks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_augment(&self, augment: &Augment) {
        self.counters.augments.fetch_add(1, Ordering::Relaxed);
        if augment.is_plain() {
            self.counters.plain_augments.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_pending(&self) {
        self.counters.pending_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let c = &self.counters;
        TelemetrySnapshot {
            messages: c.messages.load(Ordering::Relaxed),
            blocks: c.blocks.load(Ordering::Relaxed),
            degraded_blocks: c.degraded_blocks.load(Ordering::Relaxed),
            augments: c.augments.load(Ordering::Relaxed),
            plain_augments: c.plain_augments.load(Ordering::Relaxed),
            pending_events: c.pending_events.load(Ordering::Relaxed),
            events: c.events.load(Ordering::Relaxed),
        }
    }
}
