//! Drives the relay over an in-memory event script and prints what a
//! subscriber sees. Run with: cargo run --example replay

use binlog_relay::error::Result;
use binlog_relay::event::{BinlogPosition, RawEvent, RawRows, Row, RowPair, TableMapEntry};
use binlog_relay::reader::{
    LogSource, ReaderConfig, ReaderHandle, ReaderOptions, ReaderSignal,
};
use binlog_relay::subscription::TableFilter;
use binlog_relay::Relay;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// A source that replays one fixed script per connection.
struct ReplaySource {
    script: Vec<ReaderSignal>,
}

impl LogSource for ReplaySource {
    fn connect(&self, _config: &ReaderConfig) -> Result<ReaderHandle> {
        let script = self.script.clone();
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        tokio::spawn(async move {
            for signal in script {
                if tx.send(signal).await.is_err() {
                    return;
                }
            }
            let _ = (&mut stop_rx).await;
        });
        Ok(ReaderHandle::new(rx, stop_tx))
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("demo rows are objects"),
    }
}

fn event(kind: &str, rows: Option<RawRows>, offset: u64) -> RawEvent {
    RawEvent {
        kind: kind.to_string(),
        table_id: 7,
        table_map: HashMap::from([(
            7,
            TableMapEntry {
                schema: "shop".to_string(),
                table: "orders".to_string(),
            },
        )]),
        rows,
        next_position: BinlogPosition::new("mysql-bin.000001", offset),
        timestamp: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("binlog_relay=debug").init();

    let script = vec![
        ReaderSignal::Event(event("rotate", None, 4)),
        ReaderSignal::Event(event(
            "writerows",
            Some(RawRows::Flat(vec![row(json!({"id": 1, "status": "open", "total": 20}))])),
            120,
        )),
        ReaderSignal::Event(event(
            "updaterows",
            Some(RawRows::Pairs(vec![RowPair {
                before: row(json!({"id": 1, "status": "open", "total": 20})),
                after: row(json!({"id": 1, "status": "paid", "total": 20})),
            }])),
            240,
        )),
    ];

    let mut relay = Relay::new(Arc::new(ReplaySource { script }), ReaderOptions::default());
    relay.listen("shop", TableFilter::All);
    let mut events = relay.subscribe("shop");
    relay.start();

    for _ in 0..2 {
        let Some(event) = events.recv().await else {
            break;
        };
        println!(
            "{} on {}.{} at {}",
            event.kind_name(),
            event.database()?,
            event.table()?,
            event.position()
        );
        println!("  rows: {}", serde_json::to_string(&event.rows())?);
        println!(
            "  diff: {}",
            serde_json::to_string(&event.rows_diff_keyed("id", None, &[]))?
        );
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    relay.stop().await
}
