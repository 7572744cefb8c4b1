use crate::prelude::*;

/// A single value of a trace record field.
#[derive(Clone)]
#[derive(Debug)]
#[derive(PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(u64),
    Str(String),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        Self::Int(value as u64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Str(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Sink for simulation trace records.
///
/// Each record is built incrementally: `begin` opens it at a simulation
/// time, `event_type` names it, `field` adds key/value data, `end` closes
/// and flushes it. The engine holds an optional writer; with none installed
/// tracing costs a single branch.
pub trait TraceWriter {
    fn begin(&mut self, time: TimePoint);
    fn event_type(&mut self, name: &str);
    fn field(&mut self, key: &str, value: FieldValue);
    fn end(&mut self);
}

/// One decoded trace record, as produced by the in-memory writer and
/// consumed by the metric extractors.
#[derive(Clone)]
#[derive(Debug)]
pub struct TraceRecord {
    pub time: f64,
    pub kind: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl TraceRecord {
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.field(key).and_then(FieldValue::as_u64)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(FieldValue::as_f64)
    }
}
