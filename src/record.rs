// SPDX-License-Identifier: Apache-2.0

//! Decoded record types handed to the sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// A single decoded scalar value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Int(i64),
    Uint(u64),
    Str(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Uint(v) => Some(*v),
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to a JSON value. Raw byte spans become arrays of numbers.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Int(v) => Value::from(*v),
            FieldValue::Uint(v) => Value::from(*v),
            FieldValue::Str(s) => Value::from(s.as_str()),
            FieldValue::Bytes(b) => Value::Array(b.iter().map(|&x| Value::from(x)).collect()),
        }
    }
}

/// One decoded binary record, with the metadata the engine attaches on
/// emission. Consumed exactly once by the sink; the engine does not retain
/// it after emit.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    /// Decoded fields in layout order.
    pub fields: Vec<(String, FieldValue)>,
    /// Path of the originating file at the time of the read.
    pub path: PathBuf,
    /// Host identifier configured on the engine.
    pub host: String,
    /// When the record was read, not when it was written.
    pub observed_at: DateTime<Utc>,
}

impl DecodedRecord {
    pub fn new(fields: Vec<(String, FieldValue)>, path: PathBuf, host: String) -> Self {
        Self {
            fields,
            path,
            host,
            observed_at: Utc::now(),
        }
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Serialized form for sinks that want JSON.
    pub fn to_json(&self) -> Value {
        let mut fields = serde_json::Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            fields.insert(name.clone(), value.to_json());
        }
        serde_json::json!({
            "fields": fields,
            "path": self.path.display().to_string(),
            "host": self.host,
            "observed_at": self.observed_at.to_rfc3339(),
        })
    }
}
