//! Shared test helpers: a scripted log source and raw event builders.
#![allow(dead_code)] // not every test binary uses every helper

use binlog_relay::error::Result;
use binlog_relay::event::{BinlogPosition, RawEvent, RawRows, Row, RowPair, TableMapEntry};
use binlog_relay::reader::{LogSource, ReaderConfig, ReaderHandle, ReaderSignal};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A [`LogSource`] that replays a prepared signal script per connection
/// and records every [`ReaderConfig`] it was started with.
///
/// After its script is exhausted an instance stays open (delivering
/// nothing) until stopped; a connection beyond the scripted ones gets an
/// empty script.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Vec<ReaderSignal>>>,
    configs: Mutex<Vec<ReaderConfig>>,
    connects: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Vec<ReaderSignal>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            configs: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn recorded_configs(&self) -> Vec<ReaderConfig> {
        self.configs.lock().clone()
    }
}

impl LogSource for ScriptedSource {
    fn connect(&self, config: &ReaderConfig) -> Result<ReaderHandle> {
        self.configs.lock().push(config.clone());
        self.connects.fetch_add(1, Ordering::SeqCst);

        let script = self.scripts.lock().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        tokio::spawn(async move {
            for signal in script {
                if tx.send(signal).await.is_err() {
                    return;
                }
            }
            // keep the instance alive until the supervisor stops it
            let _ = (&mut stop_rx).await;
        });

        Ok(ReaderHandle::new(rx, stop_tx))
    }
}

pub fn position(offset: u64) -> BinlogPosition {
    BinlogPosition::new("mysql-bin.000001", offset)
}

pub fn table_map(table_id: u64, schema: &str, table: &str) -> HashMap<u64, TableMapEntry> {
    HashMap::from([(
        table_id,
        TableMapEntry {
            schema: schema.to_string(),
            table: table.to_string(),
        },
    )])
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("test rows must be objects, got {}", other),
    }
}

pub fn raw_event(
    kind: &str,
    table_id: u64,
    map: HashMap<u64, TableMapEntry>,
    rows: Option<RawRows>,
    offset: u64,
) -> RawEvent {
    RawEvent {
        kind: kind.to_string(),
        table_id,
        table_map: map,
        rows,
        next_position: position(offset),
        timestamp: Utc::now(),
    }
}

pub fn insert_event(schema: &str, table: &str, rows: Vec<Value>, offset: u64) -> RawEvent {
    raw_event(
        "writerows",
        7,
        table_map(7, schema, table),
        Some(RawRows::Flat(rows.into_iter().map(row).collect())),
        offset,
    )
}

pub fn update_event(
    schema: &str,
    table: &str,
    pairs: Vec<(Value, Value)>,
    offset: u64,
) -> RawEvent {
    let pairs = pairs
        .into_iter()
        .map(|(before, after)| RowPair {
            before: row(before),
            after: row(after),
        })
        .collect();
    raw_event(
        "updaterows",
        7,
        table_map(7, schema, table),
        Some(RawRows::Pairs(pairs)),
        offset,
    )
}

pub fn rotate_event(offset: u64) -> RawEvent {
    raw_event("rotate", 0, HashMap::new(), None, offset)
}

pub fn tablemap_event(schema: &str, table: &str, offset: u64) -> RawEvent {
    raw_event("tablemap", 7, table_map(7, schema, table), None, offset)
}
