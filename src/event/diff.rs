//! Row accessors and the minimal-diff computation for update events.
//!
//! Everything here operates on a [`NormalizedEvent`] and returns owned
//! data; the event itself is never mutated.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::event::normalized::{EventKind, NormalizedEvent};
use crate::event::raw::{RawRows, Row, RowPair};

/// A row batch projected alongside one scalar, typically the primary key
/// of the first affected row.
///
/// Serializes as `{ <key>: <value>, "data": [...] }`, matching the shape
/// subscribers consume.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRows {
    /// Output field name: the alias if one was given, else the column name
    pub key: String,
    /// The column's value in the first row; `Null` when absent
    pub value: Value,
    /// The full row batch
    pub data: Vec<Row>,
}

impl Serialize for KeyedRows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(&self.key, &self.value)?;
        map.serialize_entry("data", &self.data)?;
        map.end()
    }
}

impl NormalizedEvent {
    /// The event's rows as delivered to subscribers: after-images for
    /// update pairs, the flat list otherwise. Empty when the event carries
    /// no row payload.
    pub fn rows(&self) -> Vec<Row> {
        match &self.raw().rows {
            None => Vec::new(),
            Some(RawRows::Flat(rows)) => rows.clone(),
            Some(RawRows::Pairs(pairs)) => pairs.iter().map(|pair| pair.after.clone()).collect(),
        }
    }

    /// [`rows`](Self::rows) projected with `column`'s value from the first
    /// row exposed under `alias` (or the column name itself).
    pub fn rows_keyed(&self, column: &str, alias: Option<&str>) -> KeyedRows {
        let data = self.rows();
        let value = data
            .first()
            .and_then(|row| row.get(column))
            .cloned()
            .unwrap_or(Value::Null);
        KeyedRows {
            key: alias.unwrap_or(column).to_string(),
            value,
            data,
        }
    }

    /// Minimal per-row column deltas for update events.
    ///
    /// For each row pair, the result contains every column present in the
    /// after-image whose value is absent from the before-image or differs
    /// from it. Scalar values compare by value; array and object values
    /// are always reported as changed (the upstream log reader compares
    /// nested structures by identity, not deep equality). Columns named in
    /// `include` are merged in afterwards with their after-image values,
    /// so they win on collision.
    ///
    /// Non-update events return the raw row list unchanged; events without
    /// a row payload return an empty list.
    pub fn rows_diff(&self, include: &[&str]) -> Vec<Row> {
        let Some(rows) = &self.raw().rows else {
            return Vec::new();
        };
        match (self.kind(), rows) {
            (EventKind::Update, RawRows::Pairs(pairs)) => {
                pairs.iter().map(|pair| diff_row(pair, include)).collect()
            }
            (_, RawRows::Flat(rows)) => rows.clone(),
            (_, RawRows::Pairs(pairs)) => {
                pairs.iter().map(|pair| pair.after.clone()).collect()
            }
        }
    }

    /// [`rows_diff`](Self::rows_diff) projected as in
    /// [`rows_keyed`](Self::rows_keyed); the key value is taken from the
    /// first row's after-image, not from the diff.
    pub fn rows_diff_keyed(&self, column: &str, alias: Option<&str>, include: &[&str]) -> KeyedRows {
        let data = self.rows_diff(include);
        let value = self.first_after_value(column);
        KeyedRows {
            key: alias.unwrap_or(column).to_string(),
            value,
            data,
        }
    }

    fn first_after_value(&self, column: &str) -> Value {
        let row = match &self.raw().rows {
            None => None,
            Some(RawRows::Flat(rows)) => rows.first(),
            Some(RawRows::Pairs(pairs)) => pairs.first().map(|pair| &pair.after),
        };
        row.and_then(|row| row.get(column)).cloned().unwrap_or(Value::Null)
    }
}

fn diff_row(pair: &RowPair, include: &[&str]) -> Row {
    let mut out: Row = pair
        .after
        .iter()
        .filter(|(column, value)| match pair.before.get(*column) {
            None => true,
            Some(previous) => value_changed(previous, value),
        })
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    for column in include {
        if let Some(value) = pair.after.get(*column) {
            out.insert((*column).to_string(), value.clone());
        }
    }

    out
}

fn value_changed(before: &Value, after: &Value) -> bool {
    match (before, after) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => true,
        _ => before != after,
    }
}
