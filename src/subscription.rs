use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Per-database table filter.
///
/// Deserializes from either a boolean `true` ("all tables") or an explicit
/// list of table names, so subscriptions read naturally from TOML:
///
/// ```toml
/// [subscriptions]
/// shop = true
/// crm = ["customers", "invoices"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TableFilter {
    /// Every table in the database.
    #[default]
    All,
    /// Only the named tables.
    Tables(HashSet<String>),
}

impl TableFilter {
    pub fn tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TableFilter::Tables(names.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, table: &str) -> bool {
        match self {
            TableFilter::All => true,
            TableFilter::Tables(tables) => tables.contains(table),
        }
    }
}

impl Serialize for TableFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TableFilter::All => serializer.serialize_bool(true),
            TableFilter::Tables(tables) => {
                let mut names: Vec<&str> = tables.iter().map(String::as_str).collect();
                names.sort_unstable();
                names.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for TableFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            All(bool),
            Tables(Vec<String>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::All(true) => Ok(TableFilter::All),
            Repr::All(false) => Err(de::Error::custom(
                "table filter `false` is not meaningful; remove the subscription instead",
            )),
            Repr::Tables(tables) => Ok(TableFilter::tables(tables)),
        }
    }
}

/// The set of databases (and per-database table filters) currently of
/// interest.
///
/// Mutated by `listen`/`unlisten`; read by the connection supervisor only
/// when a reader instance is (re)started, so changes made while an
/// instance is active take effect on the next restart.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, TableFilter>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites the filter entry for `database`.
    pub fn listen(&mut self, database: impl Into<String>, filter: TableFilter) {
        self.entries.insert(database.into(), filter);
    }

    /// Removes the entry for `database` if present; no-op otherwise.
    pub fn unlisten(&mut self, database: &str) {
        self.entries.remove(database);
    }

    pub fn contains(&self, database: &str) -> bool {
        self.entries.contains_key(database)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clones the current subscription set for a reader (re)start.
    pub fn snapshot(&self) -> HashMap<String, TableFilter> {
        self.entries.clone()
    }
}
