use std::fmt::Write;
use std::sync::Arc;

use chunkbuf::{TraceRecord, TraceSink};

use crate::registry::CategoryRegistry;

pub(crate) const PROLOGUE: &str = "{\"traceEvents\":[";
pub(crate) const EPILOGUE: &str = "]}";

/// Appends one event object to `out`.
///
/// Keys are emitted in a fixed order, `args` is always empty, and the
/// `scope` key appears only when the event has one. Callers guarantee that
/// category, name, and scope contain no characters needing JSON escaping.
pub(crate) fn append_record(out: &mut String, registry: &CategoryRegistry, record: &TraceRecord) {
    let category = record
        .category_flag
        .and_then(|flag| registry.group_name(flag))
        .unwrap_or("");
    let _ = write!(
        out,
        "{{\"pid\":{},\"tid\":{},\"ts\":{},\"tts\":{},\"ph\":\"{}\",\"cat\":\"{}\",\"name\":\"{}\"",
        record.pid,
        record.tid,
        record.ts,
        record.tts,
        record.phase as char,
        category,
        record.name
    );
    if !record.scope.is_empty() {
        let _ = write!(out, ",\"scope\":\"{}\"", record.scope);
    }
    let _ = write!(
        out,
        ",\"args\":{{}},\"dur\":{},\"tdur\":{}}}",
        record.duration, record.cpu_duration
    );
}

/// In-memory sink producing one complete trace document.
pub struct JsonStringWriter {
    registry: Arc<CategoryRegistry>,
    out: String,
    append_comma: bool,
}

impl JsonStringWriter {
    pub fn new(registry: Arc<CategoryRegistry>) -> Self {
        JsonStringWriter {
            registry,
            out: String::from(PROLOGUE),
            append_comma: false,
        }
    }

    /// Closes the document and returns it.
    pub fn finish(mut self) -> String {
        self.out.push_str(EPILOGUE);
        self.out
    }
}

impl TraceSink for JsonStringWriter {
    fn append_event(&mut self, record: &TraceRecord) {
        if self.append_comma {
            self.out.push(',');
        }
        self.append_comma = true;
        append_record(&mut self.out, &self.registry, record);
    }

    fn flush(&mut self) {}
}
