//! A [`LogSource`] over newline-delimited JSON on standard input.
//!
//! The expected deployment shape runs the external binlog reader as an
//! upstream process writing one [`RawEvent`] JSON object per line to this
//! process's stdin. End-of-stream and read errors surface as
//! [`ReaderSignal::Failed`], so the supervisor retries them like any other
//! transport failure.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::Result;
use crate::event::{EventKind, RawEvent};
use crate::reader::source::{LogSource, ReaderConfig, ReaderHandle, ReaderSignal};

const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Reads raw events from stdin, applying the reader configuration's
/// event-kind and schema filters before forwarding.
#[derive(Debug, Default)]
pub struct JsonLineSource;

impl JsonLineSource {
    pub fn new() -> Self {
        Self
    }
}

impl LogSource for JsonLineSource {
    fn connect(&self, config: &ReaderConfig) -> Result<ReaderHandle> {
        let (signals_tx, signals) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(pump(config.clone(), signals_tx, stop_rx));
        Ok(ReaderHandle::new(signals, stop_tx))
    }
}

async fn pump(
    config: ReaderConfig,
    signals: mpsc::Sender<ReaderSignal>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("stdin reader stopped");
                return;
            }
            line = lines.next_line() => {
                let signal = match line {
                    Ok(Some(line)) => match accept(&line, &config) {
                        Some(event) => ReaderSignal::Event(event),
                        None => continue,
                    },
                    Ok(None) => ReaderSignal::Failed("event stream closed".to_string()),
                    Err(e) => ReaderSignal::Failed(format!("event stream read error: {e}")),
                };
                let terminal = matches!(signal, ReaderSignal::Failed(_));
                if signals.send(signal).await.is_err() || terminal {
                    return;
                }
            }
        }
    }
}

/// Parses one line and applies the configured filters. Malformed lines are
/// logged and skipped rather than failing the instance.
fn accept(line: &str, config: &ReaderConfig) -> Option<RawEvent> {
    if line.trim().is_empty() {
        return None;
    }

    let event: RawEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "skipping malformed raw event line");
            return None;
        }
    };

    if !config.include_events.contains(&event.kind) {
        return None;
    }

    // Schema filtering only applies to row-level kinds; structural events
    // are always forwarded. An unresolvable table id is forwarded too, so
    // the ordering violation surfaces downstream instead of being hidden
    // here.
    if EventKind::parse(&event.kind).is_row_level() {
        if let Some(entry) = event.table_map.get(&event.table_id) {
            if !config.wants(&entry.schema, &entry.table) {
                return None;
            }
        }
    }

    Some(event)
}
