//! Ordered augment dispatch.
//!
//! The coordinator feeds canonical messages to the block detector and turns
//! what it observes into [`Output`]s. Tool blocks with a registered generator
//! are augmented on the blocking pool while later messages keep flowing, but
//! outputs leave the coordinator strictly in the order they were produced:
//! every output, augmented or not, queues behind the ones before it.
//!
//! Ingestion never waits. Completions beyond `max_in_flight` queue in the
//! FIFO and start as earlier augments settle; callers stop feeding messages
//! while [`StreamCoordinator::is_saturated`] holds.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use strand_protocol::{
    Augment, BlockId, CanonicalMessage, CompletedBlock, DegradeReason, ToolCall,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::snapshots::FileSnapshots;
use crate::augment::{
    AugmentContext, AugmentGenerator, DispatchTable, SnapshotUpdate, file_path,
};
use crate::blocks::{BlockDetector, Detected};
use crate::config::{AugmentLimits, PipelineConfig};
use crate::telemetry::SessionTelemetry;

/// One ordered unit of coordinator output.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Pending {
        block_id: BlockId,
        text: String,
    },
    ToolStarted {
        block_id: BlockId,
        name: String,
        input: Value,
    },
    Block {
        block: CompletedBlock,
        augment: Option<Augment>,
    },
    TurnEnded,
    Failed {
        message: String,
    },
}

enum Slot {
    Ready(Output),
    /// Waiting for an in-flight slot.
    Queued {
        block: CompletedBlock,
        job: Job,
    },
    Augmenting {
        block: CompletedBlock,
        handle: JoinHandle<Augment>,
    },
}

/// A generator invocation with its inputs captured at completion time.
struct Job {
    generator: Arc<dyn AugmentGenerator>,
    call: ToolCall,
    ctx: AugmentContext,
}

pub struct StreamCoordinator {
    detector: BlockDetector,
    dispatch: DispatchTable,
    limits: AugmentLimits,
    snapshots: FileSnapshots,
    queue: VecDeque<Slot>,
    in_flight: usize,
    max_in_flight: usize,
    telemetry: SessionTelemetry,
}

impl StreamCoordinator {
    pub fn new(config: &PipelineConfig, dispatch: DispatchTable, telemetry: SessionTelemetry) -> Self {
        Self {
            detector: BlockDetector::new(),
            dispatch,
            limits: config.augment.clone(),
            snapshots: FileSnapshots::new(config.snapshots.clone()),
            queue: VecDeque::new(),
            in_flight: 0,
            max_in_flight: config.max_in_flight.max(1),
            telemetry,
        }
    }

    /// Feed one canonical message through the detector.
    pub fn ingest(&mut self, msg: &CanonicalMessage) {
        let detected = self.detector.process(msg);
        self.enqueue(detected);
    }

    /// Force-finalize open blocks because the upstream ended. Returns true
    /// when a turn was in progress.
    pub fn finish(&mut self, reason: DegradeReason) -> bool {
        let in_turn = self.detector.in_turn();
        let detected = self.detector.close(reason);
        self.enqueue(detected);
        in_turn
    }

    /// True while every in-flight slot is taken or an augment waits for one.
    /// Callers should settle the front before ingesting more.
    pub fn is_saturated(&self) -> bool {
        self.in_flight >= self.max_in_flight
            || self.queue.iter().any(|slot| matches!(slot, Slot::Queued { .. }))
    }

    /// Pop every output at the front of the queue that no longer waits on an
    /// augment.
    pub fn drain_ready(&mut self) -> Vec<Output> {
        let mut ready = Vec::new();
        while let Some(Slot::Ready(_)) = self.queue.front() {
            if let Some(Slot::Ready(output)) = self.queue.pop_front() {
                ready.push(output);
            }
        }
        ready
    }

    /// True when the front of the queue waits on an augment.
    pub fn has_unsettled_front(&self) -> bool {
        matches!(
            self.queue.front(),
            Some(Slot::Queued { .. } | Slot::Augmenting { .. })
        )
    }

    /// Wait for the augment at the front of the queue. Cancel safe: nothing
    /// changes until the computation has finished.
    pub async fn settle_front(&mut self) {
        if matches!(self.queue.front(), Some(Slot::Queued { .. })) {
            self.start_at(0);
        }
        if self.has_unsettled_front() {
            self.settle_at(0).await;
        }
    }

    /// True when nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Discard queued outputs and abandon in-flight augments.
    pub fn cancel(&mut self) {
        for slot in self.queue.drain(..) {
            if let Slot::Augmenting { handle, .. } = slot {
                handle.abort();
            }
        }
        self.in_flight = 0;
    }

    fn enqueue(&mut self, detected: Vec<Detected>) {
        for item in detected {
            let output = match item {
                Detected::Delta { block_id, text } => Output::Pending { block_id, text },
                Detected::ToolStarted {
                    block_id,
                    name,
                    input,
                } => Output::ToolStarted {
                    block_id,
                    name,
                    input,
                },
                Detected::Failed { message } => Output::Failed { message },
                Detected::TurnEnded => Output::TurnEnded,
                Detected::Completed(block) => {
                    self.complete(block);
                    continue;
                }
            };
            self.queue.push_back(Slot::Ready(output));
        }
    }

    fn complete(&mut self, block: CompletedBlock) {
        self.telemetry.record_block(&block);
        let generator = block
            .tool_call
            .as_ref()
            .and_then(|call| self.dispatch.get(&call.name));
        let (Some(generator), Some(call)) = (generator, block.tool_call.clone()) else {
            self.queue.push_back(Slot::Ready(Output::Block {
                block,
                augment: None,
            }));
            return;
        };

        // Snapshots advance in arrival order, whenever the augment runs.
        let ctx = AugmentContext {
            prior_content: self.observe_snapshot(generator.as_ref(), &call),
            limits: self.limits.clone(),
        };
        let job = Job {
            generator,
            call,
            ctx,
        };

        if self.in_flight < self.max_in_flight {
            let handle = self.spawn(&block, job);
            self.queue.push_back(Slot::Augmenting { block, handle });
        } else {
            debug!(
                parent: self.telemetry.span(),
                block_id = %block.block_id,
                in_flight = self.in_flight,
                "augment queued"
            );
            self.queue.push_back(Slot::Queued { block, job });
        }
    }

    fn spawn(&mut self, block: &CompletedBlock, job: Job) -> JoinHandle<Augment> {
        debug!(
            parent: self.telemetry.span(),
            block_id = %block.block_id,
            tool = %job.call.name,
            degraded = block.is_degraded(),
            "dispatching augment"
        );
        let span = self.telemetry.span().clone();
        self.in_flight += 1;
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            job.generator.generate(&job.call, &job.ctx)
        })
    }

    /// Start the queued augment at `index`.
    fn start_at(&mut self, index: usize) {
        if !matches!(self.queue.get(index), Some(Slot::Queued { .. })) {
            return;
        }
        let Some(Slot::Queued { block, job }) = self.queue.remove(index) else {
            return;
        };
        let handle = self.spawn(&block, job);
        self.queue.insert(index, Slot::Augmenting { block, handle });
    }

    /// Start queued augments, oldest first, while slots are free.
    fn start_queued(&mut self) {
        for index in 0..self.queue.len() {
            if self.in_flight >= self.max_in_flight {
                break;
            }
            self.start_at(index);
        }
    }

    /// Cached content of the file `call` targets, before the call. Updates
    /// the cache with the call's effect when it finished successfully.
    fn observe_snapshot(
        &mut self,
        generator: &dyn AugmentGenerator,
        call: &ToolCall,
    ) -> Option<String> {
        let prior = file_path(call)
            .and_then(|path| self.snapshots.get(path))
            .map(str::to_string);
        if call.result.as_ref().is_some_and(|result| !result.is_error) {
            match generator.snapshot(call, prior.as_deref()) {
                Some(SnapshotUpdate::Record { path, content }) => {
                    self.snapshots.record(&path, content)
                }
                Some(SnapshotUpdate::Forget { path }) => self.snapshots.forget(&path),
                None => {}
            }
        }
        prior
    }

    async fn settle_at(&mut self, index: usize) {
        let Some(Slot::Augmenting { handle, .. }) = self.queue.get_mut(index) else {
            return;
        };
        let joined = handle.await;

        let Some(Slot::Augmenting { block, .. }) = self.queue.remove(index) else {
            return;
        };
        let augment = joined.unwrap_or_else(|err| {
            warn!(
                parent: self.telemetry.span(),
                block_id = %block.block_id,
                error = %err,
                "augment generator panicked"
            );
            let content = block
                .tool_call
                .as_ref()
                .map(|call| call.input.to_string())
                .unwrap_or_default();
            Augment::plain(content, "augment generator panicked")
        });
        self.telemetry.record_augment(&augment);
        self.in_flight = self.in_flight.saturating_sub(1);
        self.queue.insert(
            index,
            Slot::Ready(Output::Block {
                block,
                augment: Some(augment),
            }),
        );
        self.start_queued();
    }
}

impl Drop for StreamCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight)
            .field("max_in_flight", &self.max_in_flight)
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}
