//! JSONL file sink.
//!
//! Entries go to a dedicated writer thread, so a slow disk never stalls a
//! delivery task. The sink is not lossy: when the queue is full, logging
//! callers wait rather than drop lines.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

const WRITER_THREAD: &str = "jsonl-log-writer";

/// Open `path` for appending, creating missing parent directories.
///
/// Lines written before the returned guard is dropped are flushed when it
/// drops.
pub fn open_jsonl_sink(path: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(NonBlockingBuilder::default()
        .lossy(false)
        .thread_name(WRITER_THREAD)
        .finish(file))
}
