//! Lifecycle management for the active binlog reader instance.
//!
//! One supervisor task owns the single "current instance" slot. It starts
//! a reader with the current subscription snapshot and resume position,
//! forwards its raw events, and on failure replaces it with a successor
//! resumed at the last observed position — after a fixed retry delay,
//! indefinitely. Connection failures are never fatal here.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::event::{BinlogPosition, RawEvent};
use crate::reader::source::{LogSource, ReaderConfig, ReaderHandle, ReaderOptions, ReaderSignal};
use crate::subscription::SubscriptionRegistry;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// Lifecycle tag of one reader instance.
///
/// `Active` instances are the only source of forwarded events. A `Failed`
/// instance is detached (its remaining signals are discarded) but not yet
/// replaced; it becomes `Retired` once its successor takes over or the
/// supervisor shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Active,
    Failed,
    Retired,
}

/// Emitted whenever a successor instance is created, carrying the failure
/// reason and where the successor resumes.
#[derive(Debug, Clone)]
pub struct ReaderNotice {
    /// Index of the new instance; the first start is generation 0.
    pub generation: u64,
    pub reason: String,
    pub resume_from: Option<BinlogPosition>,
}

/// Receiving side of a running supervisor: forwarded raw events plus
/// successor notices on a bounded channel.
#[derive(Debug)]
pub struct ReaderStream {
    pub events: mpsc::Receiver<RawEvent>,
    pub notices: mpsc::Receiver<ReaderNotice>,
}

/// Control side of a running supervisor.
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl SupervisorHandle {
    /// Requests shutdown. Honored at every await point in the supervisor,
    /// including during the retry delay, so no successor is created for an
    /// already-stopped supervisor.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Connection(format!("supervisor task failed: {e}"))),
        }
    }

    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.join().await
    }
}

/// Owns the lifecycle of the active reader instance.
pub struct ConnectionSupervisor {
    source: Arc<dyn LogSource>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    options: ReaderOptions,
}

/// The current instance slot with its lifecycle tag.
struct ReaderSlot {
    generation: u64,
    state: InstanceState,
    handle: ReaderHandle,
}

impl ReaderSlot {
    fn new(generation: u64, handle: ReaderHandle) -> Self {
        Self {
            generation,
            state: InstanceState::Active,
            handle,
        }
    }

    async fn recv(&mut self) -> Option<ReaderSignal> {
        self.handle.recv().await
    }

    /// Detach: no further signals from this instance are read, so
    /// duplicate failure signals can never trigger a second successor.
    fn fail(&mut self) {
        if self.state == InstanceState::Active {
            self.state = InstanceState::Failed;
        }
    }

    fn retire(&mut self) {
        self.handle.stop();
        self.state = InstanceState::Retired;
    }
}

impl ConnectionSupervisor {
    pub fn new(
        source: Arc<dyn LogSource>,
        registry: Arc<Mutex<SubscriptionRegistry>>,
        options: ReaderOptions,
    ) -> Self {
        Self {
            source,
            registry,
            options,
        }
    }

    /// Spawns the supervisor task and returns its control handle plus the
    /// event/notice stream.
    pub fn spawn(self) -> (SupervisorHandle, ReaderStream) {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (notices_tx, notices) = mpsc::channel(NOTICE_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(events_tx, notices_tx, shutdown_rx));

        (
            SupervisorHandle { shutdown, task },
            ReaderStream { events, notices },
        )
    }

    async fn run(
        self,
        events_tx: mpsc::Sender<RawEvent>,
        notices_tx: mpsc::Sender<ReaderNotice>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut resume: Option<BinlogPosition> = None;
        let mut generation: u64 = 0;
        let mut replaced: Option<String> = None;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let config = self.reader_config(resume.as_ref());
            let mut slot = match self.source.connect(&config) {
                Ok(handle) => ReaderSlot::new(generation, handle),
                Err(e) => {
                    warn!(generation, error = %e, "failed to open binlog reader");
                    replaced = Some(e.to_string());
                    generation += 1;
                    if !self.wait_retry(&mut shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            match replaced.take() {
                Some(reason) => {
                    info!(
                        generation = slot.generation,
                        reason = %reason,
                        resume = ?resume.as_ref().map(ToString::to_string),
                        "new binlog reader instance created"
                    );
                    let notice = ReaderNotice {
                        generation: slot.generation,
                        reason,
                        resume_from: resume.clone(),
                    };
                    if notices_tx.try_send(notice).is_err() {
                        debug!("notice channel full or closed; dropping successor notice");
                    }
                }
                None => {
                    info!(
                        start_at_end = self.options.start_at_end,
                        subscriptions = config.include_schema.len(),
                        "binlog reader started"
                    );
                }
            }

            let reason = loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            slot.retire();
                            return Ok(());
                        }
                    }
                    signal = slot.recv() => match signal {
                        Some(ReaderSignal::Event(event)) => {
                            resume = Some(event.next_position.clone());
                            if events_tx.send(event).await.is_err() {
                                // nobody is dispatching anymore
                                slot.retire();
                                return Ok(());
                            }
                        }
                        Some(ReaderSignal::Failed(reason)) => break reason,
                        None => break "reader signal channel closed".to_string(),
                    }
                }
            };

            slot.fail();
            warn!(
                generation = slot.generation,
                reason = %reason,
                retry_ms = self.options.retry_delay.as_millis() as u64,
                "binlog reader failed; scheduling replacement"
            );
            replaced = Some(reason);
            generation += 1;

            if !self.wait_retry(&mut shutdown).await {
                slot.retire();
                return Ok(());
            }
            slot.retire();
        }
    }

    fn reader_config(&self, resume: Option<&BinlogPosition>) -> ReaderConfig {
        ReaderConfig {
            start_at_end: self.options.start_at_end,
            include_schema: self.registry.lock().snapshot(),
            exclude_schema: self.options.exclude_schema.clone(),
            include_events: self.options.include_events.clone(),
            resume_from: resume.cloned(),
        }
    }

    /// Waits out the fixed retry delay. Returns `false` if shutdown was
    /// requested in the meantime.
    async fn wait_retry(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let delay = tokio::time::sleep(self.options.retry_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => return true,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}
