//! Session pipeline: provider messages in, ordered stream events out.

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use strand_protocol::{ControlKind, DegradeReason, StreamEvent};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;

use super::coalesce::Coalescer;
use super::coordinator::{Output, StreamCoordinator};
use super::index::{BlockIndex, NoopIndex};
use crate::augment::{AugmentGenerator, DispatchTable};
use crate::canon::{Normalizer, ProviderMessage};
use crate::config::{ConfigError, PipelineConfig};
use crate::telemetry::SessionTelemetry;

/// Message for the error emitted when the upstream ends inside a turn.
pub const CLOSED_MID_TURN: &str = "upstream closed mid-turn";

/// Builder and entry point for one session's augmentation pipeline.
pub struct StreamAugmenter {
    session_id: String,
    config: PipelineConfig,
    dispatch: DispatchTable,
    index: Arc<dyn BlockIndex>,
    telemetry: SessionTelemetry,
}

/// What woke the pipeline.
enum Step {
    Cancelled,
    Settled,
    FlushPending,
    Heartbeat,
    Input(Option<ProviderMessage>),
}

impl StreamAugmenter {
    /// Validate `config` and prepare a pipeline for `session_id`.
    pub fn new(session_id: impl Into<String>, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let session_id = session_id.into();
        Ok(Self {
            dispatch: DispatchTable::from_config(&config.tools),
            telemetry: SessionTelemetry::new(&session_id),
            index: Arc::new(NoopIndex),
            session_id,
            config,
        })
    }

    /// Register (or replace) the generator for a tool name.
    pub fn with_generator(
        mut self,
        tool_name: impl Into<String>,
        generator: Arc<dyn AugmentGenerator>,
    ) -> Self {
        self.dispatch.register(tool_name, generator);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn BlockIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_telemetry(mut self, telemetry: SessionTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn telemetry(&self) -> &SessionTelemetry {
        &self.telemetry
    }

    /// Run the pipeline over `input`.
    ///
    /// The returned stream is lazy: nothing is consumed from `input` until it
    /// is polled. Input is not read while the augment queue is saturated;
    /// heartbeats and pending flushes keep flowing meanwhile. It ends after the input ends and every queued event has
    /// been emitted, or as soon as `cancel` fires. Dropping it abandons any
    /// in-flight augments.
    pub fn run<S>(
        self,
        input: S,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static
    where
        S: Stream<Item = ProviderMessage> + Send + 'static,
    {
        let Self {
            session_id,
            config,
            dispatch,
            index,
            telemetry,
        } = self;

        stream! {
            let mut input = Box::pin(input);
            let mut normalizer = Normalizer::new(session_id.clone());
            let mut coordinator = StreamCoordinator::new(&config, dispatch, telemetry.clone());
            let mut coalescer = Coalescer::new(config.coalesce_window());
            let period = config.heartbeat_interval();
            let mut heartbeat = interval_at(Instant::now() + period, period);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut input_done = false;
            let mut closed_mid_turn = false;

            tracing::info!(parent: telemetry.span(), "pipeline started");
            telemetry.record_event();
            yield StreamEvent::control(ControlKind::Connected);

            'run: loop {
                if cancel.is_cancelled() {
                    coordinator.cancel();
                    break 'run;
                }

                for output in coordinator.drain_ready() {
                    if let Output::Block { block, augment } = &output
                        && let Err(err) = index.record(&session_id, block, augment.as_ref()).await
                    {
                        tracing::warn!(
                            parent: telemetry.span(),
                            block_id = %block.block_id,
                            error = %err,
                            "failed to index block"
                        );
                    }
                    for event in sequence(&mut coalescer, output, Instant::now()) {
                        if cancel.is_cancelled() {
                            coordinator.cancel();
                            break 'run;
                        }
                        count(&telemetry, &event);
                        yield event;
                    }
                }

                if input_done && coordinator.is_idle() {
                    if let Some(event) = coalescer.flush() {
                        count(&telemetry, &event);
                        yield event;
                    }
                    if closed_mid_turn {
                        let event = StreamEvent::error(CLOSED_MID_TURN);
                        count(&telemetry, &event);
                        yield event;
                    }
                    break 'run;
                }

                let unsettled = coordinator.has_unsettled_front();
                let saturated = coordinator.is_saturated();
                let deadline = coalescer.deadline();
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    _ = coordinator.settle_front(), if unsettled => Step::Settled,
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Step::FlushPending,
                    _ = heartbeat.tick() => Step::Heartbeat,
                    message = input.next(), if !input_done && !saturated => Step::Input(message),
                };

                match step {
                    Step::Cancelled => {
                        tracing::info!(parent: telemetry.span(), "pipeline cancelled");
                        coordinator.cancel();
                        break 'run;
                    }
                    Step::Settled => {}
                    Step::FlushPending => {
                        if let Some(event) = coalescer.flush() {
                            count(&telemetry, &event);
                            yield event;
                        }
                    }
                    Step::Heartbeat => {
                        let event = StreamEvent::control(ControlKind::Heartbeat);
                        count(&telemetry, &event);
                        yield event;
                    }
                    Step::Input(Some(message)) => {
                        telemetry.record_message();
                        let Some(canonical) = normalizer.normalize(&message) else {
                            continue 'run;
                        };
                        coordinator.ingest(&canonical);
                    }
                    Step::Input(None) => {
                        input_done = true;
                        closed_mid_turn = coordinator.finish(DegradeReason::StreamClosed);
                        tracing::debug!(parent: telemetry.span(), in_turn = closed_mid_turn, "upstream closed");
                    }
                }
            }

            tracing::info!(
                parent: telemetry.span(),
                telemetry = ?telemetry.snapshot(),
                "pipeline stopped"
            );
        }
    }
}

impl std::fmt::Debug for StreamAugmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAugmenter")
            .field("session_id", &self.session_id)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

/// Turn one coordinator output into the events to emit now. Pending text is
/// buffered in `coalescer`; anything else flushes it first.
fn sequence(coalescer: &mut Coalescer, output: Output, now: Instant) -> Vec<StreamEvent> {
    let event = match output {
        Output::Pending { block_id, text } => return coalescer.push(block_id, text, now),
        Output::Block { block, augment } => {
            coalescer.discard(&block.block_id);
            StreamEvent::Augmented { block, augment }
        }
        Output::ToolStarted {
            block_id,
            name,
            input,
        } => StreamEvent::ToolStarted {
            block_id,
            name,
            input,
        },
        Output::TurnEnded => StreamEvent::control(ControlKind::Done),
        Output::Failed { message } => StreamEvent::error(message),
    };
    let mut events: Vec<StreamEvent> = coalescer.flush().into_iter().collect();
    events.push(event);
    events
}

fn count(telemetry: &SessionTelemetry, event: &StreamEvent) {
    if matches!(event, StreamEvent::Pending { .. }) {
        telemetry.record_pending();
    }
    telemetry.record_event();
}
