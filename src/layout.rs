// SPDX-License-Identifier: Apache-2.0

//! Declarative description of a fixed-size binary record.
//!
//! A [`RecordLayout`] is an ordered list of named fields whose widths sum to
//! the total record size. It is validated once at construction and then
//! shared read-only by every decode call; decoding is pure and the same
//! block always decodes identically.
//!
//! Supported field kinds:
//! - signed and unsigned integers of 1, 2, 4, or 8 bytes with explicit
//!   byte order
//! - fixed-length byte strings, trimmed at the first zero byte
//! - raw byte spans, passed through undecoded for fields whose semantic
//!   interpretation belongs to the sink (embedded structs, timestamp pairs)

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::FieldValue;

/// Byte order for integer fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// How a field's bytes are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Signed integer of `width` bytes (1, 2, 4, or 8).
    Int {
        width: usize,
        #[serde(default)]
        order: ByteOrder,
    },
    /// Unsigned integer of `width` bytes (1, 2, 4, or 8).
    Uint {
        width: usize,
        #[serde(default)]
        order: ByteOrder,
    },
    /// Fixed-length byte string of `len` bytes, trimmed at the first zero
    /// byte and decoded lossily as UTF-8.
    String { len: usize },
    /// Raw span of `len` bytes, surfaced to the sink undecoded.
    Raw { len: usize },
}

impl FieldKind {
    /// The number of bytes this field occupies in a record.
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Int { width, .. } | FieldKind::Uint { width, .. } => *width,
            FieldKind::String { len } | FieldKind::Raw { len } => *len,
        }
    }
}

/// A single named field in a record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// A signed integer field of `width` bytes.
    pub fn int(name: impl Into<String>, width: usize, order: ByteOrder) -> Self {
        Self::new(name, FieldKind::Int { width, order })
    }

    /// An unsigned integer field of `width` bytes.
    pub fn uint(name: impl Into<String>, width: usize, order: ByteOrder) -> Self {
        Self::new(name, FieldKind::Uint { width, order })
    }

    /// A zero-trimmed string field of `len` bytes.
    pub fn string(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, FieldKind::String { len })
    }

    /// A raw byte span of `len` bytes.
    pub fn raw(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, FieldKind::Raw { len })
    }
}

/// Immutable layout of a fixed-size binary record.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    fields: Vec<FieldSpec>,
    total_size: usize,
}

impl RecordLayout {
    /// Build a layout from ordered field specs, validating widths.
    ///
    /// Fails with [`Error::InvalidLayout`] when no fields are declared, a
    /// field has zero width, an integer field has an unsupported width, or
    /// the total size overflows.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidLayout("layout declares no fields".into()));
        }

        let mut total_size = 0usize;
        for field in &fields {
            let width = field.kind.width();
            if width == 0 {
                return Err(Error::InvalidLayout(format!(
                    "field '{}' has zero width",
                    field.name
                )));
            }
            if let FieldKind::Int { width, .. } | FieldKind::Uint { width, .. } = field.kind {
                if !matches!(width, 1 | 2 | 4 | 8) {
                    return Err(Error::InvalidLayout(format!(
                        "field '{}' has unsupported integer width {}",
                        field.name, width
                    )));
                }
            }
            total_size = total_size.checked_add(width).ok_or_else(|| {
                Error::InvalidLayout(format!("total size overflows at field '{}'", field.name))
            })?;
        }

        Ok(Self { fields, total_size })
    }

    /// Total size of one record in bytes. This is also the engine's read
    /// block size: records are framed by fixed width, not by content.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Decode a block of exactly [`total_size`](Self::total_size) bytes
    /// into ordered `(name, value)` pairs.
    ///
    /// Fails with [`Error::SizeMismatch`] for any other block length; a
    /// short or long block is never truncated or zero-padded, since
    /// misaligned decoding would corrupt every subsequent field.
    pub fn decode(&self, block: &[u8]) -> Result<Vec<(String, FieldValue)>> {
        if block.len() != self.total_size {
            return Err(Error::SizeMismatch {
                expected: self.total_size,
                actual: block.len(),
            });
        }

        let mut buf = block;
        let mut out = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match field.kind {
                FieldKind::Int { width, order } => FieldValue::Int(match (width, order) {
                    (1, _) => buf.get_i8() as i64,
                    (2, ByteOrder::Little) => buf.get_i16_le() as i64,
                    (2, ByteOrder::Big) => buf.get_i16() as i64,
                    (4, ByteOrder::Little) => buf.get_i32_le() as i64,
                    (4, ByteOrder::Big) => buf.get_i32() as i64,
                    (8, ByteOrder::Little) => buf.get_i64_le(),
                    (8, ByteOrder::Big) => buf.get_i64(),
                    _ => unreachable!("widths validated at construction"),
                }),
                FieldKind::Uint { width, order } => FieldValue::Uint(match (width, order) {
                    (1, _) => buf.get_u8() as u64,
                    (2, ByteOrder::Little) => buf.get_u16_le() as u64,
                    (2, ByteOrder::Big) => buf.get_u16() as u64,
                    (4, ByteOrder::Little) => buf.get_u32_le() as u64,
                    (4, ByteOrder::Big) => buf.get_u32() as u64,
                    (8, ByteOrder::Little) => buf.get_u64_le(),
                    (8, ByteOrder::Big) => buf.get_u64(),
                    _ => unreachable!("widths validated at construction"),
                }),
                FieldKind::String { len } => {
                    let mut raw = vec![0u8; len];
                    buf.copy_to_slice(&mut raw);
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    FieldValue::Str(String::from_utf8_lossy(&raw[..end]).into_owned())
                }
                FieldKind::Raw { len } => {
                    let mut raw = vec![0u8; len];
                    buf.copy_to_slice(&mut raw);
                    FieldValue::Bytes(raw)
                }
            };
            out.push((field.name.clone(), value));
        }

        Ok(out)
    }
}
