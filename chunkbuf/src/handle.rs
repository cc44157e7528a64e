//! Arithmetic encoding of event handles.
//!
//! A handle packs `(chunk_seq, chunk_index, event_index)` into one `u64` so
//! a pending event can be patched in place after the fact. Arithmetic is
//! used rather than bit packing because the chunk count need not be a power
//! of two. Zero is reserved for "no slot".

use crate::chunk::CHUNK_SIZE;

/// Handle returned when an event could not be stored.
pub const EMPTY_HANDLE: u64 = 0;

pub(crate) fn make_handle(
    max_chunks: usize,
    chunk_index: usize,
    chunk_seq: u32,
    event_index: usize,
) -> u64 {
    let capacity = (max_chunks * CHUNK_SIZE) as u64;
    chunk_seq as u64 * capacity + (chunk_index * CHUNK_SIZE + event_index) as u64
}

pub(crate) fn extract_handle(max_chunks: usize, handle: u64) -> (usize, u32, usize) {
    let capacity = (max_chunks * CHUNK_SIZE) as u64;
    let chunk_seq = (handle / capacity) as u32;
    let indices = (handle % capacity) as usize;
    (indices / CHUNK_SIZE, chunk_seq, indices % CHUNK_SIZE)
}
