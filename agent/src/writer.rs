use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use chunkbuf::{TraceRecord, TraceSink};
use tracing::error;

use crate::json::{append_record, EPILOGUE, PROLOGUE};
use crate::registry::CategoryRegistry;

/// Events written to one log file before rotating to the next.
pub const TRACES_PER_FILE: u32 = 1 << 20;

/// Streaming sink that writes `node_trace.log.<N>` files.
///
/// JSON text accumulates in an in-memory stream; a flush moves the stream
/// into the pending-write queue and raises the busy flag. The agent thread
/// performs the queued file writes and clears the flag, which is the idle
/// gate that buffer swaps are checked against. The whole writer sits
/// behind one mutex, taken by the agent thread and, during shutdown, the
/// control thread.
pub struct LogWriter {
    directory: PathBuf,
    registry: Arc<CategoryRegistry>,
    traces_per_file: u32,
    stream: String,
    append_comma: bool,
    total_traces: u32,
    wrote_any: bool,
    suffix_written: bool,
    file_num: u32,
    file: Option<File>,
    pending: VecDeque<Vec<u8>>,
    is_writing: bool,
    error_logged: bool,
}

impl LogWriter {
    pub fn new(directory: impl Into<PathBuf>, registry: Arc<CategoryRegistry>) -> Self {
        Self::with_traces_per_file(directory, registry, TRACES_PER_FILE)
    }

    pub(crate) fn with_traces_per_file(
        directory: impl Into<PathBuf>,
        registry: Arc<CategoryRegistry>,
        traces_per_file: u32,
    ) -> Self {
        LogWriter {
            directory: directory.into(),
            registry,
            traces_per_file,
            stream: String::new(),
            append_comma: false,
            total_traces: 0,
            wrote_any: false,
            suffix_written: false,
            file_num: 0,
            file: None,
            pending: VecDeque::new(),
            is_writing: false,
            error_logged: false,
        }
    }

    /// Opens `node_trace.log.<N+1>` and starts a fresh document in the
    /// stream.
    pub(crate) fn open_new_file(&mut self) -> std::io::Result<()> {
        self.file_num += 1;
        let path = self
            .directory
            .join(format!("node_trace.log.{}", self.file_num));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(path)?;
        self.file = Some(file);
        self.stream.push_str(PROLOGUE);
        self.append_comma = false;
        self.total_traces = 0;
        Ok(())
    }

    fn submit_stream(&mut self) {
        if self.stream.is_empty() {
            return;
        }
        let bytes = std::mem::take(&mut self.stream).into_bytes();
        self.pending.push_back(bytes);
        self.is_writing = true;
    }

    /// Completion half of the write path: drains queued buffers into the
    /// current file and clears the busy flag. Runs on the agent thread,
    /// and on the control thread during shutdown and rotation.
    pub(crate) fn process_pending(&mut self) {
        while let Some(bytes) = self.pending.pop_front() {
            match self.file.as_mut() {
                Some(file) => {
                    if let Err(error) = file.write_all(&bytes) {
                        self.log_error_once(&error);
                    }
                }
                None => {
                    let error =
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no open trace log file");
                    self.log_error_once(&error);
                }
            }
        }
        self.is_writing = false;
    }

    /// Ends the current document, settles its bytes on disk, and opens the
    /// next file.
    fn rotate(&mut self) {
        self.stream.push_str(EPILOGUE);
        self.stream.push('\n');
        self.submit_stream();
        // The old file's bytes must land before the descriptor changes.
        self.process_pending();
        if let Err(error) = self.open_new_file() {
            self.file = None;
            // Start a fresh count anyway so a failed open is retried once
            // per quantum, not on every following append.
            self.total_traces = 0;
            self.append_comma = false;
            self.log_error_once(&error);
        }
    }

    /// Flushes outstanding bytes, terminates the document, and closes the
    /// file. Runs at most once; without any recorded event the epilogue is
    /// skipped entirely.
    pub(crate) fn write_suffix(&mut self) {
        if self.suffix_written {
            return;
        }
        self.suffix_written = true;
        if !self.wrote_any {
            return;
        }
        self.stream.push_str(EPILOGUE);
        self.stream.push('\n');
        self.submit_stream();
        self.process_pending();
        self.file = None;
    }

    fn log_error_once(&mut self, error: &std::io::Error) {
        if !self.error_logged {
            self.error_logged = true;
            error!(error = %error, "trace log write failed, events may be lost");
        }
    }
}

impl TraceSink for LogWriter {
    fn append_event(&mut self, record: &TraceRecord) {
        if self.suffix_written {
            // Stragglers drained after shutdown have nowhere to go.
            return;
        }
        if self.append_comma {
            self.stream.push(',');
        }
        self.append_comma = true;
        append_record(&mut self.stream, &self.registry, record);
        self.wrote_any = true;
        self.total_traces += 1;
        if self.total_traces >= self.traces_per_file {
            self.rotate();
        }
    }

    fn flush(&mut self) {
        if self.suffix_written {
            return;
        }
        if !self.wrote_any {
            // Nothing recorded yet; keep the prologue in the stream so an
            // eventless session leaves the log file empty.
            return;
        }
        self.submit_stream();
    }

    fn is_ready(&self) -> bool {
        !self.is_writing
    }
}
