//! Session hub: one pipeline task per session, fanned out to subscribers.
//!
//! Each session runs on its own task, so a panic or a stalled provider in one
//! session never touches another. Subscribers receive enveloped events over
//! bounded channels; a subscriber whose receiver is gone is dropped on the
//! next send. Subscribing to a session that already finished is rejected.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use strand_protocol::Envelope;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::canon::ProviderMessage;
use crate::config::{ConfigError, PipelineConfig};
use crate::stream::StreamAugmenter;
use crate::telemetry::{SessionTelemetry, TelemetrySnapshot};

/// Size of the per-subscriber send buffer.
const SUBSCRIBER_BUFFER_SIZE: usize = 64;

/// How many finished session ids are remembered for rejecting subscribers.
const FINISHED_SESSIONS_RETAINED: usize = 1024;

/// A sender of enveloped events to one subscriber.
pub type EventSender = mpsc::Sender<Envelope>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("session already running: {0}")]
    AlreadyRunning(String),

    #[error("session already finished: {0}")]
    Finished(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

struct SessionHandle {
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    telemetry: SessionTelemetry,
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub telemetry: TelemetrySnapshot,
}

/// Runs session pipelines and routes their events.
pub struct SessionHub {
    config: PipelineConfig,
    /// Session ID -> running pipeline
    sessions: Arc<DashMap<String, SessionHandle>>,
    /// Session ID -> (subscriber ID, sender)
    subscribers: Arc<DashMap<String, Vec<(usize, EventSender)>>>,
    /// Session ID -> finish time, for sessions no longer running
    finished: Arc<DashMap<String, DateTime<Utc>>>,
    next_subscriber: AtomicUsize,
    shutdown: CancellationToken,
}

impl SessionHub {
    pub fn new(config: PipelineConfig) -> Result<Self, HubError> {
        config.validate()?;
        Ok(Self {
            config,
            sessions: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            finished: Arc::new(DashMap::new()),
            next_subscriber: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    /// Fresh random session id.
    pub fn new_session_id() -> String {
        format!("ses_{}", uuid::Uuid::new_v4().simple())
    }

    /// Start a pipeline for `session_id` with the hub's configuration.
    pub fn start_session<S>(&self, session_id: &str, input: S) -> Result<(), HubError>
    where
        S: Stream<Item = ProviderMessage> + Send + 'static,
    {
        let augmenter = StreamAugmenter::new(session_id, self.config.clone())?;
        self.start_with(augmenter, input)
    }

    /// Start a pipeline from a prepared augmenter (custom generators, index).
    pub fn start_with<S>(&self, augmenter: StreamAugmenter, input: S) -> Result<(), HubError>
    where
        S: Stream<Item = ProviderMessage> + Send + 'static,
    {
        let session_id = augmenter.session_id().to_string();
        let cancel = self.shutdown.child_token();

        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(HubError::AlreadyRunning(session_id)),
            Entry::Vacant(slot) => {
                slot.insert(SessionHandle {
                    cancel: cancel.clone(),
                    started_at: Utc::now(),
                    telemetry: augmenter.telemetry().clone(),
                });
                self.finished.remove(&session_id);
            }
        }

        let events = augmenter.run(input, cancel);
        let subscribers = self.subscribers.clone();
        let sessions = self.sessions.clone();
        let finished = self.finished.clone();
        let pipeline = {
            let session_id = session_id.clone();
            let subscribers = subscribers.clone();
            async move {
                let mut events = Box::pin(events);
                while let Some(event) = events.next().await {
                    broadcast(&subscribers, &session_id, Envelope::new(&session_id, event)).await;
                }
            }
        };

        info!(
            "Started session {} ({} active)",
            session_id,
            self.sessions.len()
        );
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(pipeline).await {
                error!("Session {} pipeline failed: {}", session_id, e);
            }
            // The session entry is held until cleanup is done so a restart
            // of the same id waits for it. Marking finished before dropping
            // the senders keeps late subscribers out; dropping them closes
            // every receiver.
            if let Entry::Occupied(slot) = sessions.entry(session_id.clone()) {
                mark_finished(&finished, &session_id);
                subscribers.remove(&session_id);
                slot.remove();
            }
            info!("Session {} finished", session_id);
        });

        Ok(())
    }

    /// Register a subscriber for a session's events. Subscribing before the
    /// session starts is allowed; subscribing after it finished is not.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(mpsc::Receiver<Envelope>, usize), HubError> {
        // The entry guard is held across the finished check, so the
        // supervisor's removal cannot interleave with the push.
        let mut subs = self.subscribers.entry(session_id.to_string()).or_default();
        if self.finished.contains_key(session_id) {
            drop(subs);
            self.subscribers.remove_if(session_id, |_, subs| subs.is_empty());
            return Err(HubError::Finished(session_id.to_string()));
        }
        subs.retain(|(_, tx)| !tx.is_closed());

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        let subscriber_id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        subs.push((subscriber_id, tx));
        debug!("Subscriber {} attached to session {}", subscriber_id, session_id);
        Ok((rx, subscriber_id))
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`, for sinks that map
    /// events straight into SSE or WebSocket frames.
    pub fn subscribe_stream(
        &self,
        session_id: &str,
    ) -> Result<(ReceiverStream<Envelope>, usize), HubError> {
        let (rx, subscriber_id) = self.subscribe(session_id)?;
        Ok((ReceiverStream::new(rx), subscriber_id))
    }

    pub fn is_finished(&self, session_id: &str) -> bool {
        self.finished.contains_key(session_id)
    }

    pub fn unsubscribe(&self, session_id: &str, subscriber_id: usize) {
        if let Some(mut subs) = self.subscribers.get_mut(session_id) {
            subs.retain(|(id, _)| *id != subscriber_id);
            debug!("Subscriber {} detached from session {}", subscriber_id, session_id);
        }
        self.subscribers.retain(|_, subs| !subs.is_empty());
    }

    /// Cancel a session's pipeline. Returns false when it is not running.
    pub fn stop_session(&self, session_id: &str) -> bool {
        if self.is_finished(session_id) {
            return false;
        }
        match self.sessions.get(session_id) {
            Some(handle) => {
                handle.cancel.cancel();
                info!("Stopping session {}", session_id);
                true
            }
            None => false,
        }
    }

    /// A session stops counting as running once it is marked finished, just
    /// before its subscribers are closed.
    pub fn is_running(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id) && !self.is_finished(session_id)
    }

    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .iter()
            .filter(|entry| !self.is_finished(entry.key()))
            .map(|entry| SessionSummary {
                session_id: entry.key().clone(),
                started_at: entry.started_at,
                telemetry: entry.telemetry.snapshot(),
            })
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Cancel every running session.
    pub fn shutdown(&self) {
        info!("Shutting down {} sessions", self.sessions.len());
        self.shutdown.cancel();
    }
}

fn mark_finished(finished: &DashMap<String, DateTime<Utc>>, session_id: &str) {
    finished.insert(session_id.to_string(), Utc::now());
    if finished.len() > FINISHED_SESSIONS_RETAINED {
        let oldest = finished
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| entry.key().clone());
        if let Some(oldest) = oldest {
            finished.remove(&oldest);
        }
    }
}

async fn broadcast(
    subscribers: &DashMap<String, Vec<(usize, EventSender)>>,
    session_id: &str,
    envelope: Envelope,
) {
    // Clone senders out so no map guard is held across an await.
    let targets: Vec<(usize, EventSender)> = match subscribers.get(session_id) {
        Some(subs) => subs.clone(),
        None => return,
    };

    let mut gone = Vec::new();
    for (id, tx) in &targets {
        if tx.send(envelope.clone()).await.is_err() {
            warn!("Subscriber {} of session {} went away", id, session_id);
            gone.push(*id);
        }
    }
    if !gone.is_empty()
        && let Some(mut subs) = subscribers.get_mut(session_id)
    {
        subs.retain(|(id, _)| !gone.contains(id));
    }
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("sessions", &self.sessions.len())
            .field("subscribers", &self.subscribers.len())
            .field("finished", &self.finished.len())
            .finish()
    }
}
