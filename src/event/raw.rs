use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// One row image: column name -> value.
pub type Row = serde_json::Map<String, Value>;

/// A (log file, offset) pair identifying where to continue consuming after
/// a restart. Monotonically non-decreasing while a reader instance runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogPosition {
    /// Binary log file name (e.g. "mysql-bin.000003")
    pub file: String,
    /// Byte offset within the file
    pub offset: u64,
}

impl BinlogPosition {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

/// Table-map entry: associates a numeric table id with its schema and
/// table name within one connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapEntry {
    pub schema: String,
    pub table: String,
}

/// Before/after row images carried by an update event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPair {
    pub before: Row,
    pub after: Row,
}

/// The row payload of a raw event: flat rows for insert/delete, pairs for
/// update. `Pairs` must come first so untagged deserialization prefers the
/// before/after shape when both fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRows {
    Pairs(Vec<RowPair>),
    Flat(Vec<Row>),
}

impl RawRows {
    pub fn len(&self) -> usize {
        match self {
            RawRows::Pairs(pairs) => pairs.len(),
            RawRows::Flat(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A raw row-change event as handed over by the external binlog reader.
///
/// The table map accumulates over the reader connection's lifetime and is
/// carried on every event, so a row event can always be resolved against
/// the map it was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Raw event-kind string (e.g. "writerows", "rotate")
    pub kind: String,
    /// Table id referenced by row-level kinds
    #[serde(default)]
    pub table_id: u64,
    /// Table id -> schema/table metadata
    #[serde(default)]
    pub table_map: HashMap<u64, TableMapEntry>,
    /// Row payload for row-level kinds
    #[serde(default)]
    pub rows: Option<RawRows>,
    /// Log position immediately after this event
    pub next_position: BinlogPosition,
    /// Event timestamp as reported by the log source
    pub timestamp: DateTime<Utc>,
}
