pub mod json;
pub mod source;
pub mod supervisor;

pub use json::JsonLineSource;
pub use source::{
    default_include_events, LogSource, ReaderConfig, ReaderHandle, ReaderOptions, ReaderSignal,
};
pub use supervisor::{
    ConnectionSupervisor, InstanceState, ReaderNotice, ReaderStream, SupervisorHandle,
};
