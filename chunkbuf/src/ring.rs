use parking_lot::Mutex;

use crate::chunk::Chunk;
use crate::handle::{extract_handle, make_handle, EMPTY_HANDLE};
use crate::record::TraceRecord;
use crate::sink::TraceSink;

/// Bounded trace buffer that recycles its oldest chunk when full.
///
/// This is the record-continuously counterpart of [`InternalBuffer`]:
/// instead of dropping new events at capacity, the next append resets the
/// oldest chunk under a fresh sequence number, invalidating the handles
/// that pointed into it. Draining starts from the oldest live chunk so
/// records come out in append order.
///
/// [`InternalBuffer`]: crate::buffer::InternalBuffer
pub struct RingBuffer {
    max_chunks: usize,
    state: Mutex<RingState>,
}

struct RingState {
    chunks: Vec<Box<Chunk>>,
    chunk_index: usize,
    is_empty: bool,
    current_seq: u32,
}

impl RingBuffer {
    pub fn new(max_chunks: usize) -> Self {
        RingBuffer {
            max_chunks,
            state: Mutex::new(RingState {
                chunks: Vec::new(),
                chunk_index: 0,
                is_empty: true,
                current_seq: 1,
            }),
        }
    }

    fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.max_chunks
    }

    /// Appends one event, recycling the oldest chunk if the buffer is
    /// full, and returns the slot's handle. Never fails.
    pub fn add_event<F>(&self, init: F) -> u64
    where
        F: FnOnce(&mut TraceRecord),
    {
        let state = &mut *self.state.lock();
        if state.is_empty || state.chunks[state.chunk_index].is_full() {
            state.chunk_index = if state.is_empty {
                0
            } else {
                self.next_index(state.chunk_index)
            };
            let seq = state.current_seq;
            state.current_seq = state.current_seq.wrapping_add(1);
            // The ring advances one slot at a time, so the index is at most
            // the current length.
            if state.chunk_index < state.chunks.len() {
                state.chunks[state.chunk_index].reset(seq);
            } else {
                state.chunks.push(Box::new(Chunk::new(seq)));
            }
            state.is_empty = false;
        }
        let chunk_index = state.chunk_index;
        let chunk = &mut state.chunks[chunk_index];
        let seq = chunk.seq();
        let (event_index, record) = chunk.add();
        init(record);
        make_handle(self.max_chunks, chunk_index, seq, event_index)
    }

    /// Runs `f` on the record a handle refers to, unless the handle's
    /// chunk has been recycled since.
    pub fn with_event<F, R>(&self, handle: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut TraceRecord) -> R,
    {
        if handle == EMPTY_HANDLE {
            return None;
        }
        let state = &mut *self.state.lock();
        let (chunk_index, chunk_seq, event_index) = extract_handle(self.max_chunks, handle);
        if chunk_index >= state.chunks.len() {
            return None;
        }
        let chunk = &mut state.chunks[chunk_index];
        if chunk.seq() != chunk_seq {
            return None;
        }
        Some(f(chunk.record_mut(event_index)))
    }

    /// Streams every live record into `sink` in append order, oldest chunk
    /// first, then marks the buffer empty.
    pub fn drain_to(&self, sink: &mut dyn TraceSink) {
        let state = &mut *self.state.lock();
        if !state.is_empty {
            let mut index = self.next_index(state.chunk_index);
            loop {
                if let Some(chunk) = state.chunks.get(index) {
                    for i in 0..chunk.len() {
                        sink.append_event(chunk.record(i));
                    }
                }
                if index == state.chunk_index {
                    break;
                }
                index = self.next_index(index);
            }
        }
        sink.flush();
        state.is_empty = true;
    }
}
