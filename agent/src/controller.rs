use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chunkbuf::{DoubleBuffer, EMPTY_HANDLE};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::TraceConfig;
use crate::registry::{CategoryRegistry, ENABLED_FOR_RECORDING};
use crate::{current_thread_id, monotonic_micros, thread_cpu_micros};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Disabled,
    Recording,
}

/// Public face of the recording pipeline.
///
/// Owns the recording state machine and forwards accepted events to the
/// double buffer. Producers fetch a category flag once per call site and
/// pass it back in; the flag byte alone decides whether an event is
/// recorded, so the append fast path takes no controller lock.
pub struct TracingController {
    buffer: Arc<DoubleBuffer>,
    registry: Arc<CategoryRegistry>,
    state: Mutex<ControllerState>,
}

struct ControllerState {
    mode: Mode,
    config: TraceConfig,
}

impl TracingController {
    pub fn new(buffer: Arc<DoubleBuffer>, registry: Arc<CategoryRegistry>) -> Self {
        TracingController {
            buffer,
            registry,
            state: Mutex::new(ControllerState {
                mode: Mode::Disabled,
                config: TraceConfig::default(),
            }),
        }
    }

    /// Adopts `config`, recomputes every category flag, and begins
    /// recording. Starting while already recording is a programming error
    /// and is ignored with a diagnostic.
    pub fn start_tracing(&self, config: TraceConfig) {
        let mut state = self.state.lock();
        if state.mode == Mode::Recording {
            warn!("start_tracing called while already recording");
            return;
        }
        state.config = config;
        state.mode = Mode::Recording;
        let config = &state.config;
        self.registry
            .update_all(|group| config.is_category_group_enabled(group));
    }

    /// Stops recording, clears every category flag, and drains the buffer
    /// synchronously, bypassing the writer's idle gate. Producers racing
    /// the stop are filtered by the cleared flags; an event already past
    /// that check may still land in the buffer and be dropped later.
    pub fn stop_tracing(&self) {
        {
            let mut state = self.state.lock();
            if state.mode == Mode::Disabled {
                warn!("stop_tracing called while not recording");
                return;
            }
            state.mode = Mode::Disabled;
            self.registry.update_all(|_| false);
        }
        self.buffer.drain();
    }

    /// Returns the stable flag byte for a category group, interning it on
    /// first use.
    pub fn category_group_enabled(&self, group: &str) -> &'static AtomicU8 {
        let state = self.state.lock();
        let enabled =
            state.mode == Mode::Recording && state.config.is_category_group_enabled(group);
        self.registry.intern(group, enabled)
    }

    /// Reverse lookup from a flag byte to its group name.
    pub fn category_group_name(&self, flag: &AtomicU8) -> Option<&'static str> {
        self.registry.group_name(flag)
    }

    /// Records one event and returns its handle, or [`EMPTY_HANDLE`] when
    /// the category is disabled or the buffer is full. pid, tid, and both
    /// clocks are captured here.
    #[allow(clippy::too_many_arguments)]
    pub fn add_trace_event(
        &self,
        phase: u8,
        category_flag: &'static AtomicU8,
        name: &'static str,
        scope: &'static str,
        id: u64,
        bind_id: u64,
        num_args: u32,
        flags: u32,
    ) -> u64 {
        if category_flag.load(Ordering::Relaxed) & ENABLED_FOR_RECORDING == 0 {
            return EMPTY_HANDLE;
        }
        let pid = std::process::id();
        let tid = current_thread_id();
        let ts = monotonic_micros();
        let tts = thread_cpu_micros();
        self.buffer.add_event(|record| {
            *record = chunkbuf::TraceRecord {
                phase,
                category_flag: Some(category_flag),
                name,
                scope,
                id,
                bind_id,
                num_args,
                flags,
                pid,
                tid,
                ts,
                tts,
                duration: 0,
                cpu_duration: 0,
            };
        })
    }

    /// Patches the duration of a pending event in place. A handle whose
    /// chunk has been recycled since is silently ignored.
    pub fn update_trace_event_duration(
        &self,
        _category_flag: &AtomicU8,
        _name: &str,
        handle: u64,
    ) {
        let now = monotonic_micros();
        let now_cpu = thread_cpu_micros();
        self.buffer
            .with_event(handle, |record| record.update_duration(now, now_cpu));
    }
}
