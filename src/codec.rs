//! Varint node codec - compact binary form of serialized nodes
//!
//! This is the record format of the pack: every flushed delta payload is
//! stored as one encoded node. Lengths and counts use LEB128 varints,
//! numbers are fixed-width little endian.
//!
//! Format: `[str: tag] [varint: prop_count] ([str: name] [value])*
//! [varint: child_count] [node]*`
//!
//! Author: Moroya Sakamoto

use crate::error::CodecError;
use crate::node::{SerializedNode, Value};

// ── Value Type Discriminants ───────────────────────────────────────────

const VAL_STR: u8 = 0x00;
const VAL_INT: u8 = 0x01;
const VAL_INT64: u8 = 0x02;
const VAL_BOOL: u8 = 0x03;
const VAL_FLOAT: u8 = 0x04;

// ── Varint (LEB128) ───────────────────────────────────────────────────

/// Encode a u32 as LEB128 varint.
#[inline]
fn encode_varint_u32(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a u32 from LEB128 varint.
#[inline]
fn decode_varint_u32(data: &[u8], pos: &mut usize) -> Result<u32, CodecError> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *data.get(*pos).ok_or(CodecError::Truncated(*pos))?;
        *pos += 1;
        value |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return Err(CodecError::VarintOverflow(*pos));
        }
    }
    Ok(value)
}

#[inline]
fn encode_usize(value: usize, buf: &mut Vec<u8>) {
    encode_varint_u32(value as u32, buf);
}

#[inline]
fn decode_usize(data: &[u8], pos: &mut usize) -> Result<usize, CodecError> {
    decode_varint_u32(data, pos).map(|v| v as usize)
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], CodecError> {
    let end = pos.checked_add(len).ok_or(CodecError::Truncated(*pos))?;
    let slice = data.get(*pos..end).ok_or(CodecError::Truncated(*pos))?;
    *pos = end;
    Ok(slice)
}

fn take_array<const N: usize>(data: &[u8], pos: &mut usize) -> Result<[u8; N], CodecError> {
    let at = *pos;
    take(data, pos, N)?
        .try_into()
        .map_err(|_| CodecError::Truncated(at))
}

// ── String Codec ───────────────────────────────────────────────────────

fn encode_string(s: &str, buf: &mut Vec<u8>) {
    encode_usize(s.len(), buf);
    buf.extend_from_slice(s.as_bytes());
}

fn decode_string(data: &[u8], pos: &mut usize) -> Result<String, CodecError> {
    let len = decode_usize(data, pos)?;
    let at = *pos;
    let bytes = take(data, pos, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(at))
}

// ── Value Codec ────────────────────────────────────────────────────────

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Str(s) => {
            buf.push(VAL_STR);
            encode_string(s, buf);
        }
        Value::Int(v) => {
            buf.push(VAL_INT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Int64(v) => {
            buf.push(VAL_INT64);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Bool(b) => {
            buf.push(VAL_BOOL);
            buf.push(*b as u8);
        }
        Value::Float(v) => {
            buf.push(VAL_FLOAT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn decode_value(data: &[u8], pos: &mut usize) -> Result<Value, CodecError> {
    let tag = *data.get(*pos).ok_or(CodecError::Truncated(*pos))?;
    *pos += 1;
    match tag {
        VAL_STR => Ok(Value::Str(decode_string(data, pos)?)),
        VAL_INT => Ok(Value::Int(i32::from_le_bytes(take_array(data, pos)?))),
        VAL_INT64 => Ok(Value::Int64(i64::from_le_bytes(take_array(data, pos)?))),
        VAL_BOOL => Ok(Value::Bool(take_array::<1>(data, pos)?[0] != 0)),
        VAL_FLOAT => Ok(Value::Float(f64::from_le_bytes(take_array(data, pos)?))),
        other => Err(CodecError::UnknownValueTag(other)),
    }
}

// ── Node Codec ─────────────────────────────────────────────────────────

fn encode_node_into(node: &SerializedNode, buf: &mut Vec<u8>) {
    encode_string(node.tag(), buf);
    encode_usize(node.properties().len(), buf);
    for (name, value) in node.properties() {
        encode_string(name, buf);
        encode_value(value, buf);
    }
    encode_usize(node.num_children(), buf);
    for child in node.children() {
        encode_node_into(child, buf);
    }
}

fn decode_node_at(data: &[u8], pos: &mut usize) -> Result<SerializedNode, CodecError> {
    let tag = decode_string(data, pos)?;
    let mut node = SerializedNode::new(&tag);
    let prop_count = decode_usize(data, pos)?;
    for _ in 0..prop_count {
        let name = decode_string(data, pos)?;
        let value = decode_value(data, pos)?;
        node.set_property(&name, value);
    }
    let child_count = decode_usize(data, pos)?;
    for _ in 0..child_count {
        node.append_child(decode_node_at(data, pos)?);
    }
    Ok(node)
}

/// Encode a node (and its subtree) into a fresh buffer.
pub fn encode_node(node: &SerializedNode) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_node_into(node, &mut buf);
    buf
}

/// Decode exactly one node; trailing bytes are an error.
pub fn decode_node(data: &[u8]) -> Result<SerializedNode, CodecError> {
    let mut pos = 0;
    let node = decode_node_at(data, &mut pos)?;
    if pos != data.len() {
        return Err(CodecError::TrailingBytes(data.len() - pos));
    }
    Ok(node)
}

/// Encoded size in bytes.
pub fn encoded_node_size(node: &SerializedNode) -> usize {
    encode_node(node).len()
}

// ── Tests ──────────────────────────────────────────────────────────────
