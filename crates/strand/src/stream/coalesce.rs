//! Pending-text coalescing.
//!
//! Consecutive deltas for the same block are merged into one `Pending` event
//! when they arrive within the coalescing window. A delta for a different
//! block, or any non-pending event, flushes the buffer first so event order is
//! preserved.

use std::time::Duration;

use strand_protocol::{BlockId, StreamEvent};
use tokio::time::Instant;

#[derive(Debug)]
struct Buffered {
    block_id: BlockId,
    text: String,
    deadline: Instant,
}

#[derive(Debug)]
pub struct Coalescer {
    window: Duration,
    buffer: Option<Buffered>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: None,
        }
    }

    /// Buffer a delta. Returns the events that are ready to emit: a flushed
    /// buffer for another block, and the delta itself when coalescing is off.
    pub fn push(&mut self, block_id: BlockId, text: String, now: Instant) -> Vec<StreamEvent> {
        let mut ready = Vec::new();
        match self.buffer.as_mut() {
            Some(buffered) if buffered.block_id == block_id => {
                buffered.text.push_str(&text);
                return ready;
            }
            Some(_) => ready.extend(self.flush()),
            None => {}
        }

        if self.window.is_zero() {
            ready.push(StreamEvent::Pending {
                block_id,
                delta_text: text,
            });
        } else {
            self.buffer = Some(Buffered {
                block_id,
                text,
                deadline: now + self.window,
            });
        }
        ready
    }

    /// Take the buffered text as one `Pending` event.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        self.buffer.take().map(|buffered| StreamEvent::Pending {
            block_id: buffered.block_id,
            delta_text: buffered.text,
        })
    }

    /// Drop buffered text for `block_id`; its final event supersedes it.
    pub fn discard(&mut self, block_id: &str) {
        if self
            .buffer
            .as_ref()
            .is_some_and(|buffered| buffered.block_id == block_id)
        {
            self.buffer = None;
        }
    }

    /// When the buffered text must be flushed.
    pub fn deadline(&self) -> Option<Instant> {
        self.buffer.as_ref().map(|buffered| buffered.deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }
}
