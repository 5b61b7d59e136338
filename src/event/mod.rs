pub mod diff;
pub mod normalized;
pub mod raw;

pub use diff::KeyedRows;
pub use normalized::{EventKind, NormalizedEvent};
pub use raw::{BinlogPosition, RawEvent, RawRows, Row, RowPair, TableMapEntry};
