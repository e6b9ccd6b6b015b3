//! Chunked, resumable table sync.

mod control;
mod engine;
mod progress;
mod strategy;

pub use control::Control;
pub use engine::{DumpConfig, ProgressCallback, SyncEngine};
pub use progress::{SyncProgress, SyncState};
pub use strategy::{chunk_request, count_request, filter_expression, Checkpoint, SyncStrategy};
