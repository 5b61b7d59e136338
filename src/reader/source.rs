//! The boundary to the external binlog-reading component.
//!
//! The relay does not parse the replication protocol itself; it consumes
//! raw events from a [`LogSource`] implementation. Each `connect` call
//! yields one reader instance whose events and terminal failure signal
//! arrive on the returned handle's channel.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::event::{BinlogPosition, RawEvent};
use crate::subscription::TableFilter;

/// The minimum set of raw event kinds a transport must deliver.
pub fn default_include_events() -> HashSet<String> {
    ["rotate", "tablemap", "writerows", "updaterows", "deleterows"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Static reader options shared by every (re)started instance.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// On first start with no prior position, begin at the current end of
    /// the log rather than replaying history.
    pub start_at_end: bool,
    /// Raw event kinds the transport should deliver.
    pub include_events: HashSet<String>,
    /// Databases to exclude regardless of subscriptions.
    pub exclude_schema: HashMap<String, TableFilter>,
    /// Fixed delay before a failed instance's successor is created.
    pub retry_delay: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            start_at_end: true,
            include_events: default_include_events(),
            exclude_schema: HashMap::new(),
            retry_delay: Duration::from_millis(4000),
        }
    }
}

/// Configuration passed to each (re)started reader instance.
///
/// Built by the connection supervisor from a fresh subscription-registry
/// snapshot, the static [`ReaderOptions`], and the current resume
/// position.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub start_at_end: bool,
    pub include_schema: HashMap<String, TableFilter>,
    pub exclude_schema: HashMap<String, TableFilter>,
    pub include_events: HashSet<String>,
    /// Where to resume; `None` only on first start.
    pub resume_from: Option<BinlogPosition>,
}

impl ReaderConfig {
    /// Whether the transport should deliver events for `database.table`.
    pub fn wants(&self, database: &str, table: &str) -> bool {
        if let Some(filter) = self.exclude_schema.get(database) {
            if filter.matches(table) {
                return false;
            }
        }
        if self.include_schema.is_empty() {
            return true;
        }
        self.include_schema
            .get(database)
            .is_some_and(|filter| filter.matches(table))
    }
}

/// A signal from a running reader instance.
#[derive(Debug, Clone)]
pub enum ReaderSignal {
    /// A raw event; the transport delivers these in log order.
    Event(RawEvent),
    /// Terminal failure of this instance with the reason. The instance
    /// delivers nothing after this.
    Failed(String),
}

/// Handle to one running reader instance.
///
/// Dropping the handle stops the instance; [`stop`](Self::stop) does the
/// same explicitly and is idempotent.
#[derive(Debug)]
pub struct ReaderHandle {
    signals: mpsc::Receiver<ReaderSignal>,
    stop: Option<oneshot::Sender<()>>,
}

impl ReaderHandle {
    pub fn new(signals: mpsc::Receiver<ReaderSignal>, stop: oneshot::Sender<()>) -> Self {
        Self {
            signals,
            stop: Some(stop),
        }
    }

    pub async fn recv(&mut self) -> Option<ReaderSignal> {
        self.signals.recv().await
    }

    /// Tears down the instance's event subscription immediately.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A factory for reader instances.
///
/// `connect` must return promptly; connection establishment happens in the
/// background and failures — at connect time or later — arrive as
/// [`ReaderSignal::Failed`] on the handle's channel.
pub trait LogSource: Send + Sync + 'static {
    fn connect(&self, config: &ReaderConfig) -> Result<ReaderHandle>;
}
