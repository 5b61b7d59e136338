//! Error types and result handling for binlog-relay.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use binlog_relay::{Error, Result};
//!
//! fn open_reader() -> Result<()> {
//!     Err(Error::Connection("binlog stream closed".to_string()))
//! }
//!
//! match open_reader() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for binlog-relay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error from the config file or environment overrides.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error, typically from the raw event transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error when decoding or encoding events.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure of the connection to the log reader.
    ///
    /// Inside the connection supervisor these are always recovered by the
    /// retry loop; the variant surfaces only for non-recoverable task
    /// failures (e.g. a panicked supervisor).
    #[error("Connection error: {0}")]
    Connection(String),

    /// A row event referenced a table id with no table-map entry.
    ///
    /// This indicates an upstream ordering violation: table-map events
    /// must be delivered before the row events that depend on them. It is
    /// surfaced immediately rather than dropped.
    #[error("Table map error: no entry for table id {table_id}")]
    MissingTableMap {
        /// The table id the raw event carried
        table_id: u64,
    },

    /// Graceful shutdown was requested.
    ///
    /// Not really an error but uses the error mechanism to cleanly exit
    /// the dispatch loop.
    #[error("Shutdown requested")]
    Shutdown,
}

/// A convenient Result type alias for binlog-relay operations.
pub type Result<T> = std::result::Result<T, Error>;
