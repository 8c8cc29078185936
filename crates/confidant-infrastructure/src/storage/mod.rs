//! File storage primitives.

pub mod atomic_file;

pub use atomic_file::{AtomicFile, AtomicFileError, FileFormat, FileLock, write_atomic};

use confidant_core::{ConfidantError, Result};

/// Runs blocking file work on the blocking thread pool.
pub(crate) async fn run_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConfidantError::internal(format!("Failed to join blocking task: {}", e)))?
}
