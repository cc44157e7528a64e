pub mod buffer;
pub mod chunk;
pub mod double;
pub mod handle;
pub mod record;
pub mod ring;
pub mod sink;

pub use buffer::{FlushSignal, InternalBuffer, DEFAULT_MAX_CHUNKS};
pub use chunk::{Chunk, CHUNK_SIZE};
pub use double::DoubleBuffer;
pub use handle::EMPTY_HANDLE;
pub use record::TraceRecord;
pub use ring::RingBuffer;
pub use sink::TraceSink;
