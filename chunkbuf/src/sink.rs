use crate::record::TraceRecord;

/// Destination for drained trace records.
///
/// `append_event` receives records one at a time in drain order; `flush`
/// marks the end of one drain and hands whatever the sink accumulated to
/// its backing store. `is_ready` is the idle gate consulted before a
/// buffer swap: while a previous write is still in flight the sink reports
/// not ready and the flush is skipped.
pub trait TraceSink {
    fn append_event(&mut self, record: &TraceRecord);
    fn flush(&mut self);
    fn is_ready(&self) -> bool {
        true
    }
}
