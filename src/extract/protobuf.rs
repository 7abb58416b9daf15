//! Best-effort protobuf wire-format walker.
//!
//! Decompressed workbooks look like protobuf messages, but the schema is
//! unknown, so this walks the top level only and never fails: bytes that do
//! not form a field are skipped one at a time.  The tag is read as a single
//! byte, which covers field numbers 1–15.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

/// Default cap on fields returned by [`walk_fields`].
pub const DEFAULT_FIELD_LIMIT: usize = 100;
/// Length-delimited fields longer than this are treated as noise.
pub const MAX_DELIMITED_LEN: u64 = 10_000;
/// Bytes kept from a non-text length-delimited field.
const BYTES_PREVIEW: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum ProtoValue {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Text(String),
    /// Non-text payload (possibly a nested message), truncated preview.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtoField {
    pub offset:       usize,
    pub field_number: u8,
    pub wire_type:    u8,
    pub value:        ProtoValue,
}

impl std::fmt::Display for ProtoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{:<8} #{:<3} ", self.offset, self.field_number)?;
        match &self.value {
            ProtoValue::Varint(v)  => write!(f, "varint  {v}"),
            ProtoValue::Fixed64(v) => write!(f, "fixed64 {v:#018x}"),
            ProtoValue::Fixed32(v) => write!(f, "fixed32 {v:#010x}"),
            ProtoValue::Text(s)    => write!(f, "string  {s:?}"),
            ProtoValue::Bytes(b)   => write!(f, "bytes   {}", hex::encode(b)),
        }
    }
}

/// Read a base-128 varint starting at `pos`.  Returns the value and the
/// position after it; a truncated varint yields what was read so far.
fn read_varint(data: &[u8], mut pos: usize) -> (u64, usize) {
    let mut value = 0u64;
    let mut shift = 0u32;
    while pos < data.len() {
        let b = data[pos];
        pos += 1;
        if shift < 64 {
            value |= u64::from(b & 0x7f) << shift;
        }
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    (value, pos)
}

fn looks_like_text(s: &str) -> bool {
    s.chars().all(|c| !c.is_control() || c == '\n' || c == '\t') || s.chars().any(|c| !c.is_ascii())
}

/// Walk top-level fields of `data`, returning at most `limit`.
pub fn walk_fields(data: &[u8], limit: usize) -> Vec<ProtoField> {
    let mut fields = Vec::new();
    let mut i = 0usize;

    while i < data.len() && fields.len() < limit {
        let tag = data[i];
        if tag == 0 {
            i += 1;
            continue;
        }
        let offset       = i;
        let field_number = tag >> 3;
        let wire_type    = tag & 0x07;
        i += 1;

        let value = match wire_type {
            0 => {
                let (v, next) = read_varint(data, i);
                i = next;
                ProtoValue::Varint(v)
            }
            1 => {
                let mut cur = Cursor::new(&data[i..]);
                match cur.read_u64::<LittleEndian>() {
                    Ok(v) => { i += 8; ProtoValue::Fixed64(v) }
                    Err(_) => break,
                }
            }
            2 => {
                let (len, next) = read_varint(data, i);
                i = next;
                if len >= MAX_DELIMITED_LEN || i as u64 + len > data.len() as u64 {
                    continue;
                }
                let end = i + len as usize;
                let content = &data[i..end];
                i = end;
                match std::str::from_utf8(content) {
                    Ok(s) if looks_like_text(s) => ProtoValue::Text(s.to_owned()),
                    _ => ProtoValue::Bytes(content[..content.len().min(BYTES_PREVIEW)].to_vec()),
                }
            }
            5 => {
                let mut cur = Cursor::new(&data[i..]);
                match cur.read_u32::<LittleEndian>() {
                    Ok(v) => { i += 4; ProtoValue::Fixed32(v) }
                    Err(_) => break,
                }
            }
            // Groups (3, 4) and reserved wire types: not a field start.
            _ => continue,
        };

        fields.push(ProtoField { offset, field_number, wire_type, value });
    }
    fields
}
