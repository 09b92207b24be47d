//! HTTP-triggered daemon: trigger endpoint + single-flight sync processor.

mod error;
pub mod runtime;
pub mod server;

pub use error::DaemonError;
pub use runtime::{
    init_tracing, run, spawn_processor, start_blocking, LastSync, SyncHandle, SyncSettings,
    SyncSummary,
};
pub use server::{router, AppState};
