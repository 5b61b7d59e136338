pub mod config;
pub mod error;
pub mod relay;
pub mod subscription;

pub mod event;
pub mod reader;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{EventKind, NormalizedEvent};
pub use relay::Relay;
