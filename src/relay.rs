//! The public entry point: wires the subscription registry, the connection
//! supervisor, and the event normalizer together and fans normalized
//! events out to per-database subscribers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::NormalizedEvent;
use crate::reader::source::{LogSource, ReaderOptions};
use crate::reader::supervisor::{ConnectionSupervisor, ReaderStream, SupervisorHandle};
use crate::subscription::{SubscriptionRegistry, TableFilter};

type SubscriberMap = HashMap<String, Vec<mpsc::UnboundedSender<Arc<NormalizedEvent>>>>;

/// A change-data-capture relay over an external binlog reader.
///
/// ```rust,no_run
/// use binlog_relay::reader::JsonLineSource;
/// use binlog_relay::subscription::TableFilter;
/// use binlog_relay::{Relay, Result};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut relay = Relay::new(Arc::new(JsonLineSource::new()), Default::default());
///     relay.listen("shop", TableFilter::All);
///     let mut events = relay.subscribe("shop");
///
///     relay.start();
///     while let Some(event) = events.recv().await {
///         println!("{} on {}", event.kind_name(), event.table()?);
///     }
///     relay.stop().await
/// }
/// ```
pub struct Relay {
    source: Arc<dyn LogSource>,
    options: ReaderOptions,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    subscribers: Arc<Mutex<SubscriberMap>>,
    supervisor: Option<SupervisorHandle>,
    dispatcher: Option<JoinHandle<Result<()>>>,
}

impl Relay {
    pub fn new(source: Arc<dyn LogSource>, options: ReaderOptions) -> Self {
        Self {
            source,
            options,
            registry: Arc::new(Mutex::new(SubscriptionRegistry::new())),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            supervisor: None,
            dispatcher: None,
        }
    }

    /// Builds a relay from configuration, pre-registering its
    /// subscriptions.
    pub fn from_config(source: Arc<dyn LogSource>, config: &Config) -> Self {
        let relay = Self::new(source, config.reader_options());
        for (database, filter) in &config.subscriptions {
            relay.listen(database.clone(), filter.clone());
        }
        relay
    }

    /// Adds or overwrites the table filter for `database`.
    ///
    /// Takes effect the next time a reader instance is (re)started.
    pub fn listen(&self, database: impl Into<String>, filter: TableFilter) {
        let database = database.into();
        debug!(database = %database, "subscribed");
        self.registry.lock().listen(database, filter);
    }

    /// Removes the filter entry for `database` if present.
    pub fn unlisten(&self, database: &str) {
        debug!(database = %database, "unsubscribed");
        self.registry.lock().unlisten(database);
    }

    /// Snapshot of the current subscription set.
    pub fn subscriptions(&self) -> HashMap<String, TableFilter> {
        self.registry.lock().snapshot()
    }

    /// Registers an output channel for one database's normalized events.
    pub fn subscribe(&self, database: &str) -> mpsc::UnboundedReceiver<Arc<NormalizedEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(database.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Starts the connection supervisor and the dispatch loop. Idempotent
    /// while running.
    pub fn start(&mut self) {
        if self.supervisor.is_some() {
            return;
        }

        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&self.source),
            Arc::clone(&self.registry),
            self.options.clone(),
        );
        let (handle, stream) = supervisor.spawn();
        let dispatcher = tokio::spawn(dispatch(stream, Arc::clone(&self.subscribers)));

        self.supervisor = Some(handle);
        self.dispatcher = Some(dispatcher);
    }

    /// Runs until shutdown is requested or the dispatch loop fails.
    ///
    /// A table-map lookup failure terminates the loop with the error; see
    /// [`Error::MissingTableMap`].
    pub async fn run(&mut self) -> Result<()> {
        self.start();

        let dispatched = match self.dispatcher.take() {
            Some(task) => join_dispatch(task).await,
            None => Ok(()),
        };

        let stopped = match self.supervisor.take() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        };

        dispatched.and(stopped)
    }

    /// Requests shutdown of the active reader instance and the dispatch
    /// loop without waiting for either.
    pub fn shutdown(&self) {
        if let Some(handle) = &self.supervisor {
            handle.shutdown();
        }
    }

    /// Shuts down and waits for the supervisor and dispatcher to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown();

        let stopped = match self.supervisor.take() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        };

        let dispatched = match self.dispatcher.take() {
            Some(task) => join_dispatch(task).await,
            None => Ok(()),
        };

        info!("relay stopped");
        stopped.and(dispatched)
    }
}

async fn join_dispatch(task: JoinHandle<Result<()>>) -> Result<()> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(Error::Connection(format!("dispatch task failed: {e}"))),
    }
}

/// Drains the supervisor's event stream: normalizes each raw event,
/// filters structural kinds, and fans the rest out by database name. One
/// event is fully processed before the next is read.
async fn dispatch(mut stream: ReaderStream, subscribers: Arc<Mutex<SubscriberMap>>) -> Result<()> {
    let mut notices_open = true;
    loop {
        tokio::select! {
            notice = stream.notices.recv(), if notices_open => {
                match notice {
                    Some(notice) => info!(
                        generation = notice.generation,
                        reason = %notice.reason,
                        "binlog reader replaced"
                    ),
                    None => notices_open = false,
                }
            }
            event = stream.events.recv() => {
                let Some(raw) = event else {
                    // supervisor is gone; clean shutdown
                    return Ok(());
                };
                let event = NormalizedEvent::normalize(raw);

                if event.kind().is_structural() {
                    debug!(
                        kind = %event.kind_name(),
                        position = %event.position(),
                        "structural event observed"
                    );
                    continue;
                }

                let database = event.database()?.to_string();
                let table = event.table()?;
                debug!(
                    kind = %event.kind_name(),
                    database = %database,
                    table = %table,
                    "received binlog event"
                );

                deliver(&subscribers, &database, Arc::new(event));
            }
        }
    }
}

fn deliver(
    subscribers: &Arc<Mutex<SubscriberMap>>,
    database: &str,
    event: Arc<NormalizedEvent>,
) {
    let mut subscribers = subscribers.lock();
    if let Some(channels) = subscribers.get_mut(database) {
        channels.retain(|tx| tx.send(Arc::clone(&event)).is_ok());
    }
}
