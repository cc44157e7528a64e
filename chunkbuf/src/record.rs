use std::sync::atomic::AtomicU8;

/// A single recorded trace event.
///
/// `name` and `scope` are either string literals from call sites or strings
/// interned by the category registry; both must outlive the recording
/// session. An empty `scope` means the event has no scope. The category
/// flag points at the registry's flag byte for the event's group and is
/// `None` only in slots that have never been filled.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceRecord {
    pub phase: u8,
    pub category_flag: Option<&'static AtomicU8>,
    pub name: &'static str,
    pub scope: &'static str,
    pub id: u64,
    pub bind_id: u64,
    pub num_args: u32,
    pub flags: u32,
    pub pid: u32,
    pub tid: u32,
    /// Monotonic wall time at capture, in microseconds.
    pub ts: i64,
    /// Thread CPU time at capture, in microseconds.
    pub tts: i64,
    pub duration: u64,
    pub cpu_duration: u64,
}

impl TraceRecord {
    /// Folds the elapsed wall and CPU time since capture into the record.
    pub fn update_duration(&mut self, now: i64, now_cpu: i64) {
        self.duration = now.saturating_sub(self.ts).max(0) as u64;
        self.cpu_duration = now_cpu.saturating_sub(self.tts).max(0) as u64;
    }
}
