//! Binary encode/decode for persisted history and framework values.
//!
//! All integers are little-endian. Strings and byte arrays are
//! length-prefixed with a `u32` length. Optional values use a presence
//! flag byte (0 = absent, 1 = present). Every top-level value starts with
//! `[FORMAT_VERSION u8] [kind u8]` so a value read under the wrong key is
//! rejected instead of misinterpreted.
//!
//! Encoding writes into a `Vec<u8>` and cannot fail; decoding reads from
//! any `Read` source and rejects truncated, oversized or trailing input.

use std::io::Read;

use croupier_core::{DataItems, DataValue, HistoryRecord, StateInfo, Step};

use crate::error::CodecError;
use crate::FORMAT_VERSION;

/// Kind byte of an encoded [`DataItems`].
pub const KIND_DATA_ITEMS: u8 = 1;
/// Kind byte of an encoded [`StateInfo`].
pub const KIND_STATE_INFO: u8 = 2;
/// Kind byte of an encoded [`HistoryRecord`].
pub const KIND_HISTORY_RECORD: u8 = 3;
/// Kind byte of an encoded `u32` counter.
pub const KIND_COUNTER: u8 = 4;
/// Kind byte of an encoded boolean flag.
pub const KIND_FLAG: u8 = 5;
/// Kind byte of an encoded optional string.
pub const KIND_OPTIONAL_TEXT: u8 = 6;

const VALUE_BOOL: u8 = 0;
const VALUE_INT: u8 = 1;
const VALUE_TEXT: u8 = 2;
const VALUE_BYTES: u8 = 3;

/// Upper bound on any single length prefix.
const MAX_LENGTH: usize = 16 * 1024 * 1024;

// ── Primitive writers ───────────────────────────────────────────

/// Append a single byte.
pub fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

/// Append a little-endian u32.
pub fn put_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a little-endian i64.
pub fn put_i64_le(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a length-prefixed byte array (u32 length + bytes).
pub fn put_length_prefixed_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    put_u32_le(buf, b.len() as u32);
    buf.extend_from_slice(b);
}

/// Append a length-prefixed UTF-8 string.
pub fn put_length_prefixed_str(buf: &mut Vec<u8>, s: &str) {
    put_length_prefixed_bytes(buf, s.as_bytes());
}

/// Append a presence flag and, if present, the string.
pub fn put_optional_str(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            put_u8(buf, 1);
            put_length_prefixed_str(buf, s);
        }
        None => put_u8(buf, 0),
    }
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, CodecError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian i64.
pub fn read_i64_le(r: &mut dyn Read) -> Result<i64, CodecError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Read a length-prefixed byte array.
pub fn read_length_prefixed_bytes(r: &mut dyn Read) -> Result<Vec<u8>, CodecError> {
    let len = read_u32_le(r)? as usize;
    if len > MAX_LENGTH {
        return Err(CodecError::MalformedRecord {
            detail: format!("length prefix {len} exceeds limit {MAX_LENGTH}"),
        });
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, CodecError> {
    let bytes = read_length_prefixed_bytes(r)?;
    String::from_utf8(bytes).map_err(|e| CodecError::MalformedRecord {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

/// Read a presence flag and, if set, a string.
pub fn read_optional_str(r: &mut dyn Read) -> Result<Option<String>, CodecError> {
    match read_u8(r)? {
        0 => Ok(None),
        1 => Ok(Some(read_length_prefixed_str(r)?)),
        flag => Err(CodecError::MalformedRecord {
            detail: format!("invalid presence flag: {flag}"),
        }),
    }
}

// ── Header ──────────────────────────────────────────────────────

fn put_header(buf: &mut Vec<u8>, kind: u8) {
    put_u8(buf, FORMAT_VERSION);
    put_u8(buf, kind);
}

fn read_header(r: &mut dyn Read, expected: u8) -> Result<(), CodecError> {
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion { found: version });
    }
    let kind = read_u8(r)?;
    if kind != expected {
        return Err(CodecError::UnexpectedKind {
            expected,
            found: kind,
        });
    }
    Ok(())
}

/// Decode a complete top-level value from `bytes`, rejecting trailing data.
fn decode_exact<T>(
    mut bytes: &[u8],
    kind: u8,
    body: impl FnOnce(&mut dyn Read) -> Result<T, CodecError>,
) -> Result<T, CodecError> {
    read_header(&mut bytes, kind)?;
    let value = body(&mut bytes)?;
    if !bytes.is_empty() {
        return Err(CodecError::MalformedRecord {
            detail: format!("{} trailing bytes", bytes.len()),
        });
    }
    Ok(value)
}

// ── DataItems ───────────────────────────────────────────────────

fn put_value(buf: &mut Vec<u8>, value: &DataValue) {
    match value {
        DataValue::Bool(b) => {
            put_u8(buf, VALUE_BOOL);
            put_u8(buf, u8::from(*b));
        }
        DataValue::Int(i) => {
            put_u8(buf, VALUE_INT);
            put_i64_le(buf, *i);
        }
        DataValue::Text(s) => {
            put_u8(buf, VALUE_TEXT);
            put_length_prefixed_str(buf, s);
        }
        DataValue::Bytes(b) => {
            put_u8(buf, VALUE_BYTES);
            put_length_prefixed_bytes(buf, b);
        }
    }
}

fn read_value(r: &mut dyn Read) -> Result<DataValue, CodecError> {
    match read_u8(r)? {
        VALUE_BOOL => match read_u8(r)? {
            0 => Ok(DataValue::Bool(false)),
            1 => Ok(DataValue::Bool(true)),
            b => Err(CodecError::MalformedRecord {
                detail: format!("invalid bool byte: {b}"),
            }),
        },
        VALUE_INT => Ok(DataValue::Int(read_i64_le(r)?)),
        VALUE_TEXT => Ok(DataValue::Text(read_length_prefixed_str(r)?)),
        VALUE_BYTES => Ok(DataValue::Bytes(read_length_prefixed_bytes(r)?)),
        tag => Err(CodecError::UnknownValueTag { tag }),
    }
}

/// Append the body of a [`DataItems`] (no header).
///
/// Layout: `[provider count u32]` then per provider
/// `[name str] [entry count u32] ([service str] [tag u8] [value])*`.
pub fn put_data_items(buf: &mut Vec<u8>, items: &DataItems) {
    let providers: Vec<&str> = items.providers().collect();
    put_u32_le(buf, providers.len() as u32);
    for provider in providers {
        put_length_prefixed_str(buf, provider);
        match items.provider(provider) {
            Some(services) => {
                put_u32_le(buf, services.len() as u32);
                for (service, value) in services {
                    put_length_prefixed_str(buf, service);
                    put_value(buf, value);
                }
            }
            None => put_u32_le(buf, 0),
        }
    }
}

/// Read the body of a [`DataItems`] (no header).
pub fn read_data_items(r: &mut dyn Read) -> Result<DataItems, CodecError> {
    let provider_count = read_u32_le(r)?;
    let mut items = DataItems::new();
    for _ in 0..provider_count {
        let provider = read_length_prefixed_str(r)?;
        let entry_count = read_u32_le(r)?;
        for _ in 0..entry_count {
            let service = read_length_prefixed_str(r)?;
            let value = read_value(r)?;
            items.insert(provider.as_str(), service, value);
        }
    }
    Ok(items)
}

/// Encode a [`DataItems`] as a top-level value.
pub fn encode_data_items(items: &DataItems) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, KIND_DATA_ITEMS);
    put_data_items(&mut buf, items);
    buf
}

/// Decode a top-level [`DataItems`].
pub fn decode_data_items(bytes: &[u8]) -> Result<DataItems, CodecError> {
    decode_exact(bytes, KIND_DATA_ITEMS, read_data_items)
}

// ── StateInfo ───────────────────────────────────────────────────

/// Encode a [`StateInfo`].
pub fn encode_state_info(info: &StateInfo) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, KIND_STATE_INFO);
    put_length_prefixed_str(&mut buf, &info.current_state);
    put_optional_str(&mut buf, info.pending_state.as_deref());
    put_u8(&mut buf, info.current_step.tag());
    buf
}

/// Decode a [`StateInfo`].
pub fn decode_state_info(bytes: &[u8]) -> Result<StateInfo, CodecError> {
    decode_exact(bytes, KIND_STATE_INFO, |r| {
        let current_state = read_length_prefixed_str(r)?;
        let pending_state = read_optional_str(r)?;
        let tag = read_u8(r)?;
        let current_step = Step::from_tag(tag).ok_or_else(|| CodecError::MalformedRecord {
            detail: format!("invalid step tag: {tag}"),
        })?;
        Ok(StateInfo {
            current_state,
            pending_state,
            current_step,
        })
    })
}

// ── HistoryRecord ───────────────────────────────────────────────

/// Encode a [`HistoryRecord`].
pub fn encode_history_record(record: &HistoryRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, KIND_HISTORY_RECORD);
    put_u32_le(&mut buf, record.step_number);
    put_length_prefixed_str(&mut buf, &record.state_name);
    put_data_items(&mut buf, &record.data);
    buf
}

/// Decode a [`HistoryRecord`].
pub fn decode_history_record(bytes: &[u8]) -> Result<HistoryRecord, CodecError> {
    decode_exact(bytes, KIND_HISTORY_RECORD, |r| {
        Ok(HistoryRecord {
            step_number: read_u32_le(r)?,
            state_name: read_length_prefixed_str(r)?,
            data: read_data_items(r)?,
        })
    })
}

// ── Scalars ─────────────────────────────────────────────────────

/// Encode a `u32` counter.
pub fn encode_counter(v: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6);
    put_header(&mut buf, KIND_COUNTER);
    put_u32_le(&mut buf, v);
    buf
}

/// Decode a `u32` counter.
pub fn decode_counter(bytes: &[u8]) -> Result<u32, CodecError> {
    decode_exact(bytes, KIND_COUNTER, read_u32_le)
}

/// Encode a boolean flag.
pub fn encode_flag(v: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3);
    put_header(&mut buf, KIND_FLAG);
    put_u8(&mut buf, u8::from(v));
    buf
}

/// Decode a boolean flag.
pub fn decode_flag(bytes: &[u8]) -> Result<bool, CodecError> {
    decode_exact(bytes, KIND_FLAG, |r| match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        b => Err(CodecError::MalformedRecord {
            detail: format!("invalid flag byte: {b}"),
        }),
    })
}

/// Encode an optional string.
pub fn encode_optional_text(v: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, KIND_OPTIONAL_TEXT);
    put_optional_str(&mut buf, v);
    buf
}

/// Decode an optional string.
pub fn decode_optional_text(bytes: &[u8]) -> Result<Option<String>, CodecError> {
    decode_exact(bytes, KIND_OPTIONAL_TEXT, read_optional_str)
}
