use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{FlushSignal, InternalBuffer};
use crate::record::TraceRecord;
use crate::sink::TraceSink;

/// Pair of internal buffers with an active index.
///
/// Appends and lookups go to the active buffer. A flush first consults the
/// sink's idle gate, then swaps the active index and drains the buffer that
/// was active a moment ago. Producers that arrive during the drain write
/// into the other buffer, which decouples flush latency from the producer
/// fast path.
pub struct DoubleBuffer {
    buffers: [InternalBuffer; 2],
    active: AtomicUsize,
    sink: Arc<Mutex<dyn TraceSink + Send>>,
}

impl DoubleBuffer {
    pub fn new(
        max_chunks: usize,
        flush_signal: FlushSignal,
        sink: Arc<Mutex<dyn TraceSink + Send>>,
    ) -> Self {
        DoubleBuffer {
            buffers: [
                InternalBuffer::new(max_chunks, flush_signal.clone()),
                InternalBuffer::new(max_chunks, flush_signal),
            ],
            active: AtomicUsize::new(0),
            sink,
        }
    }

    /// Appends one event to the active buffer. See
    /// [`InternalBuffer::add_event`].
    pub fn add_event<F>(&self, init: F) -> u64
    where
        F: FnOnce(&mut TraceRecord),
    {
        self.buffers[self.active.load(Ordering::Acquire)].add_event(init)
    }

    /// Runs `f` on the record a handle refers to in the active buffer. A
    /// handle issued before the last swap resolves only until its chunk is
    /// recycled; the sequence check rejects it afterwards.
    pub fn with_event<F, R>(&self, handle: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut TraceRecord) -> R,
    {
        self.buffers[self.active.load(Ordering::Acquire)].with_event(handle, f)
    }

    /// Swaps the buffers and drains the one that was active.
    ///
    /// Returns `false` without touching any state while the sink is still
    /// writing; the next flush request retries. Expected to be called from
    /// one thread at a time (the agent thread, or the control thread while
    /// stopping).
    pub fn flush(&self) -> bool {
        let mut sink = self.sink.lock();
        if !sink.is_ready() {
            return false;
        }
        let drained = self.active.fetch_xor(1, Ordering::AcqRel);
        self.buffers[drained].drain_to(&mut *sink);
        true
    }

    /// Drains both buffers without swapping and without consulting the
    /// idle gate. Only meaningful once producers have quiesced, on the
    /// stop path.
    ///
    /// The inactive buffer goes first: a producer that read the index
    /// before the last swap may have appended there after its drain, and
    /// within one producer those events precede anything it wrote to the
    /// buffer that is active now.
    pub fn drain(&self) {
        let mut sink = self.sink.lock();
        let active = self.active.load(Ordering::Acquire);
        self.buffers[1 - active].drain_to(&mut *sink);
        self.buffers[active].drain_to(&mut *sink);
    }
}
