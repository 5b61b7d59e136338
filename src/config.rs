use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::reader::source::{default_include_events, ReaderOptions};
use crate::subscription::TableFilter;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    /// Databases to relay, keyed by database name. A value of `true`
    /// subscribes every table; a list subscribes only the named tables.
    #[serde(default)]
    pub subscriptions: HashMap<String, TableFilter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_start_at_end")]
    pub start_at_end: bool,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_include_events")]
    pub include_events: HashSet<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            start_at_end: default_start_at_end(),
            retry_delay_ms: default_retry_delay_ms(),
            include_events: default_include_events(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BINLOG_RELAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            start_at_end: self.source.start_at_end,
            include_events: self.source.include_events.clone(),
            exclude_schema: HashMap::new(),
            retry_delay: Duration::from_millis(self.source.retry_delay_ms),
        }
    }
}

fn default_start_at_end() -> bool {
    true
}

fn default_retry_delay_ms() -> u64 {
    4000
}
