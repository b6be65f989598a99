pub mod config;
pub mod error;
pub mod events;
pub mod log_capture;
pub mod log_sanitize;
pub mod messages;
pub mod nodes;
pub mod registry;
pub mod replay;
pub mod simulate;
pub mod state;
mod sync;
pub mod ui;

pub use error::{Error, Result};
pub use events::{BuildEvent, BuildEventSink, DiagnosticKind, Importance};
pub use state::{BuildState, Progress};
