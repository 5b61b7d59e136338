use std::fmt;

use crate::error::{Error, Result};
use crate::event::raw::{BinlogPosition, RawEvent, TableMapEntry};

/// Stable event-kind taxonomy.
///
/// Parsed once at the boundary from the raw kind string; all downstream
/// dispatch matches on this enum instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    /// Position marker: the log rotated to a new file.
    Rotate,
    /// Table-map metadata for a table id.
    TableMap,
    /// Any raw kind outside the row-level and structural sets.
    Other,
}

impl EventKind {
    /// Derives the kind from a raw kind string: a `rows` suffix is removed
    /// and `write` maps to `insert`, so `writerows` -> `Insert`,
    /// `updaterows` -> `Update`, `deleterows` -> `Delete`. Anything not in
    /// the taxonomy parses as [`EventKind::Other`].
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix("rows").unwrap_or(raw) {
            "write" => EventKind::Insert,
            "update" => EventKind::Update,
            "delete" => EventKind::Delete,
            "rotate" => EventKind::Rotate,
            "tablemap" => EventKind::TableMap,
            _ => EventKind::Other,
        }
    }

    pub fn is_row_level(&self) -> bool {
        matches!(self, EventKind::Insert | EventKind::Update | EventKind::Delete)
    }

    /// Structural kinds are logged but never dispatched to subscribers.
    pub fn is_structural(&self) -> bool {
        matches!(self, EventKind::Rotate | EventKind::TableMap)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Rotate => "rotate",
            EventKind::TableMap => "tablemap",
            EventKind::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized, read-only view over one raw event.
///
/// Constructed by the dispatch loop and shared with subscribers as
/// `Arc<NormalizedEvent>`; never mutated after construction.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    kind: EventKind,
    raw: RawEvent,
}

impl NormalizedEvent {
    pub fn normalize(raw: RawEvent) -> Self {
        Self {
            kind: EventKind::parse(&raw.kind),
            raw,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Stable kind name. For kinds outside the taxonomy this passes the
    /// raw string through with the `rows` suffix removed, so unknown kinds
    /// keep their own identifiers.
    pub fn kind_name(&self) -> &str {
        match self.kind {
            EventKind::Other => self.raw.kind.strip_suffix("rows").unwrap_or(&self.raw.kind),
            kind => kind.as_str(),
        }
    }

    /// Database the event belongs to, resolved through the table map.
    ///
    /// Fails with [`Error::MissingTableMap`] if the table id has no entry,
    /// which indicates that table-map events were filtered out upstream.
    pub fn database(&self) -> Result<&str> {
        self.table_entry().map(|entry| entry.schema.as_str())
    }

    /// Table the event belongs to, resolved through the table map.
    pub fn table(&self) -> Result<&str> {
        self.table_entry().map(|entry| entry.table.as_str())
    }

    pub fn position(&self) -> &BinlogPosition {
        &self.raw.next_position
    }

    pub fn raw(&self) -> &RawEvent {
        &self.raw
    }

    fn table_entry(&self) -> Result<&TableMapEntry> {
        self.raw
            .table_map
            .get(&self.raw.table_id)
            .ok_or(Error::MissingTableMap {
                table_id: self.raw.table_id,
            })
    }
}
