//! Concrete trace sinks: JSON lines, in-memory, and the null writer.

use crate::prelude::*;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Streams one JSON object per record: `{"t": ..., "type": ..., ...}`.
/// Field names are stable identifiers shared with the metric extractors.
pub struct JsonLinesWriter<W: Write> {
    out: W,
    record: serde_json::Map<String, serde_json::Value>,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, record: serde_json::Map::new() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn json_value(value: FieldValue) -> serde_json::Value {
        match value {
            FieldValue::Float(v) => serde_json::json!(v),
            FieldValue::Int(v) => serde_json::json!(v),
            FieldValue::Str(v) => serde_json::json!(v),
        }
    }
}

impl<W: Write> TraceWriter for JsonLinesWriter<W> {
    fn begin(&mut self, time: TimePoint) {
        self.record.clear();
        self.record.insert("t".into(), serde_json::json!(time.as_secs()));
    }

    fn event_type(&mut self, name: &str) {
        self.record.insert("type".into(), serde_json::json!(name));
    }

    fn field(&mut self, key: &str, value: FieldValue) {
        self.record.insert(key.into(), Self::json_value(value));
    }

    fn end(&mut self) {
        let record = serde_json::Value::Object(std::mem::take(&mut self.record));
        writeln!(self.out, "{record}").expect("trace output is writable");
    }
}

/// Collects records into a shared vector, for tests and post-run analysis.
pub struct MemoryTraceWriter {
    records: Rc<RefCell<Vec<TraceRecord>>>,
    current: Option<TraceRecord>,
}

impl MemoryTraceWriter {
    /// Returns the writer and the shared handle the records land in.
    pub fn new() -> (Self, Rc<RefCell<Vec<TraceRecord>>>) {
        let records = Rc::new(RefCell::new(Vec::new()));
        let writer = Self { records: Rc::clone(&records), current: None };
        (writer, records)
    }
}

impl TraceWriter for MemoryTraceWriter {
    fn begin(&mut self, time: TimePoint) {
        self.current = Some(TraceRecord {
            time: time.as_secs(),
            kind: String::new(),
            fields: Vec::new(),
        });
    }

    fn event_type(&mut self, name: &str) {
        if let Some(record) = self.current.as_mut() {
            record.kind = name.to_owned();
        }
    }

    fn field(&mut self, key: &str, value: FieldValue) {
        if let Some(record) = self.current.as_mut() {
            record.fields.push((key.to_owned(), value));
        }
    }

    fn end(&mut self) {
        if let Some(record) = self.current.take() {
            self.records.borrow_mut().push(record);
        }
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn begin(&mut self, _time: TimePoint) {}
    fn event_type(&mut self, _name: &str) {}
    fn field(&mut self, _key: &str, _value: FieldValue) {}
    fn end(&mut self) {}
}

// =============================================================================

#[test]
fn json_lines_format() {
    let mut writer = JsonLinesWriter::new(Vec::new());

    writer.begin(TimePoint::secs(1.5));
    writer.event_type("dispatch");
    writer.field("sid", 3usize.into());
    writer.field("cpu", 0usize.into());
    writer.end();

    let out = String::from_utf8(writer.into_inner()).unwrap();
    let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(value["t"], 1.5);
    assert_eq!(value["type"], "dispatch");
    assert_eq!(value["sid"], 3);
    assert_eq!(value["cpu"], 0);
}

#[test]
fn memory_writer_collects_records() {
    let (mut writer, records) = MemoryTraceWriter::new();

    writer.begin(TimePoint::secs(2.0));
    writer.event_type("job_arrival");
    writer.field("tid", 1usize.into());
    writer.end();

    let records = records.borrow();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].time, 2.0);
    assert_eq!(records[0].kind, "job_arrival");
    assert_eq!(records[0].u64_field("tid"), Some(1));
}
