use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::Chunk;
use crate::handle::{extract_handle, make_handle, EMPTY_HANDLE};
use crate::record::TraceRecord;
use crate::sink::TraceSink;

/// Default number of chunks per internal buffer.
pub const DEFAULT_MAX_CHUNKS: usize = 1024;

/// Fraction of the buffer that may fill before a flush is requested.
/// This number should be customizable.
const FLUSH_THRESHOLD: f64 = 0.75;

/// Callback used to ask the agent thread for a flush.
///
/// The buffer holds a closure rather than a reference to the agent, so the
/// two can be constructed independently and neither owns the other.
pub type FlushSignal = Arc<dyn Fn() + Send + Sync>;

/// Bounded multi-producer trace buffer.
///
/// Producers append under a mutex held only across slot assignment, never
/// across I/O. When the buffer is full new events are dropped and the
/// empty handle is returned.
pub struct InternalBuffer {
    max_chunks: usize,
    flush_threshold: usize,
    flush_signal: FlushSignal,
    state: Mutex<BufferState>,
}

struct BufferState {
    chunks: Vec<Box<Chunk>>,
    total_chunks: usize,
    current_seq: u32,
}

impl InternalBuffer {
    pub fn new(max_chunks: usize, flush_signal: FlushSignal) -> Self {
        InternalBuffer {
            max_chunks,
            flush_threshold: (max_chunks as f64 * FLUSH_THRESHOLD).ceil() as usize,
            flush_signal,
            state: Mutex::new(BufferState {
                chunks: Vec::new(),
                total_chunks: 0,
                // Sequence numbers start at 1 so no live slot encodes to the
                // empty handle.
                current_seq: 1,
            }),
        }
    }

    /// Appends one event, running `init` on the fresh slot under the buffer
    /// lock, and returns the slot's handle.
    ///
    /// Returns [`EMPTY_HANDLE`] without storing anything when every chunk
    /// is occupied. Crossing the flush threshold requests an asynchronous
    /// flush before anything else; the request may be ignored if the
    /// writer is busy, in which case the next append above the threshold
    /// re-requests it.
    pub fn add_event<F>(&self, init: F) -> u64
    where
        F: FnOnce(&mut TraceRecord),
    {
        let state = &mut *self.state.lock();
        if state.total_chunks >= self.flush_threshold {
            (self.flush_signal)();
        }
        if state.total_chunks == 0 || state.chunks[state.total_chunks - 1].is_full() {
            if state.total_chunks == self.max_chunks {
                return EMPTY_HANDLE;
            }
            let seq = state.current_seq;
            state.current_seq = state.current_seq.wrapping_add(1);
            if state.total_chunks < state.chunks.len() {
                state.chunks[state.total_chunks].reset(seq);
            } else {
                state.chunks.push(Box::new(Chunk::new(seq)));
            }
            state.total_chunks += 1;
        }
        let chunk_index = state.total_chunks - 1;
        let chunk = &mut state.chunks[chunk_index];
        let seq = chunk.seq();
        let (event_index, record) = chunk.add();
        init(record);
        make_handle(self.max_chunks, chunk_index, seq, event_index)
    }

    /// Runs `f` on the record a handle refers to.
    ///
    /// Returns `None` for the empty handle, for out-of-range handles, and
    /// for handles whose chunk has been recycled since the event was
    /// added; the sequence check guarantees stale data is never exposed.
    pub fn with_event<F, R>(&self, handle: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut TraceRecord) -> R,
    {
        if handle == EMPTY_HANDLE {
            return None;
        }
        let state = &mut *self.state.lock();
        let (chunk_index, chunk_seq, event_index) = extract_handle(self.max_chunks, handle);
        if chunk_index >= state.total_chunks {
            return None;
        }
        let chunk = &mut state.chunks[chunk_index];
        if chunk.seq() != chunk_seq {
            return None;
        }
        Some(f(chunk.record_mut(event_index)))
    }

    /// Streams every live record into `sink`, chunks in insertion order and
    /// records in fill order, then resets the buffer. Chunk allocations
    /// are retained and recycled by later appends.
    pub fn drain_to(&self, sink: &mut dyn TraceSink) {
        let state = &mut *self.state.lock();
        for chunk in state.chunks.iter().take(state.total_chunks) {
            for i in 0..chunk.len() {
                sink.append_event(chunk.record(i));
            }
        }
        sink.flush();
        state.total_chunks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNK_SIZE;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_signal() -> FlushSignal {
        Arc::new(|| {})
    }

    #[derive(Default)]
    struct IdSink {
        ids: Vec<u64>,
        flushes: usize,
    }

    impl TraceSink for IdSink {
        fn append_event(&mut self, record: &TraceRecord) {
            self.ids.push(record.id);
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    fn fill(buffer: &InternalBuffer, count: usize) -> Vec<u64> {
        (0..count)
            .map(|i| {
                buffer.add_event(|record| {
                    record.phase = b'X';
                    record.id = i as u64;
                })
            })
            .collect()
    }

    #[test]
    fn overflow_returns_the_empty_handle() {
        let buffer = InternalBuffer::new(1, no_signal());
        let handles = fill(&buffer, CHUNK_SIZE + 1);
        for handle in &handles[..CHUNK_SIZE] {
            assert_ne!(*handle, EMPTY_HANDLE);
        }
        assert_eq!(handles[CHUNK_SIZE], EMPTY_HANDLE);

        let mut sink = IdSink::default();
        buffer.drain_to(&mut sink);
        assert_eq!(sink.ids.len(), CHUNK_SIZE);
        assert_eq!(sink.ids.last().copied(), Some(CHUNK_SIZE as u64 - 1));
    }

    #[test]
    fn overflow_does_not_disturb_stored_events() {
        let buffer = InternalBuffer::new(1, no_signal());
        let handles = fill(&buffer, CHUNK_SIZE + 5);
        // Overflowed appends leave earlier slots resolvable.
        for (i, handle) in handles[..CHUNK_SIZE].iter().enumerate() {
            let id = buffer.with_event(*handle, |record| record.id);
            assert_eq!(id, Some(i as u64));
        }
        for handle in &handles[CHUNK_SIZE..] {
            assert_eq!(*handle, EMPTY_HANDLE);
            assert!(buffer.with_event(*handle, |_| ()).is_none());
        }
    }

    #[rstest]
    #[case::two_chunks(2)]
    #[case::four_chunks(4)]
    fn drains_in_append_order_and_resets(#[case] max_chunks: usize) {
        let buffer = InternalBuffer::new(max_chunks, no_signal());
        let count = max_chunks * CHUNK_SIZE - 3;
        fill(&buffer, count);

        let mut sink = IdSink::default();
        buffer.drain_to(&mut sink);
        assert_eq!(sink.ids, (0..count as u64).collect::<Vec<_>>());
        assert_eq!(sink.flushes, 1);

        let mut empty = IdSink::default();
        buffer.drain_to(&mut empty);
        assert!(empty.ids.is_empty());
        assert_eq!(empty.flushes, 1);
    }

    #[test]
    fn handles_stay_valid_until_their_chunk_is_recycled() {
        let buffer = InternalBuffer::new(2, no_signal());
        let handles = fill(&buffer, 2 * CHUNK_SIZE);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(buffer.with_event(*handle, |r| r.id), Some(i as u64));
        }

        let mut sink = IdSink::default();
        buffer.drain_to(&mut sink);

        // The drain recycles chunk slots; a new fill gives them fresh
        // sequence numbers, so the old handles must stop resolving.
        let fresh = fill(&buffer, CHUNK_SIZE);
        for handle in &handles {
            assert!(buffer.with_event(*handle, |_| ()).is_none());
        }
        for (i, handle) in fresh.iter().enumerate() {
            assert_eq!(buffer.with_event(*handle, |r| r.id), Some(i as u64));
        }
    }

    #[test]
    fn duration_updates_apply_in_place() {
        let buffer = InternalBuffer::new(1, no_signal());
        let handle = buffer.add_event(|record| {
            record.ts = 100;
            record.tts = 50;
        });
        let updated = buffer.with_event(handle, |record| {
            record.update_duration(150, 130);
            (record.duration, record.cpu_duration)
        });
        assert_eq!(updated, Some((50, 80)));
    }

    #[rstest]
    #[case::signals_from_three_quarters(4, 3)]
    #[case::small_buffer_signals_when_occupied(1, 1)]
    fn requests_a_flush_above_the_threshold(
        #[case] max_chunks: usize,
        #[case] threshold_chunks: usize,
    ) {
        let signals = Arc::new(AtomicUsize::new(0));
        let counter = signals.clone();
        let buffer = InternalBuffer::new(
            max_chunks,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
        );

        // Appends observe the live chunk count at entry, so the append
        // that allocates the threshold-crossing chunk is itself silent.
        let silent = (threshold_chunks - 1) * CHUNK_SIZE + 1;
        fill(&buffer, silent);
        assert_eq!(signals.load(Ordering::Relaxed), 0);

        // Every append at or above the threshold re-requests a flush.
        fill(&buffer, 2);
        assert_eq!(signals.load(Ordering::Relaxed), 2);
    }
}
