//! Config-frame framing: how WID lists travel over the transport.
//!
//! Every frame starts with `[kind, seq, len LE16]`, `len` counting the header.

use super::{Wid, WidClass, WidId};
use crate::{Error, Result};

pub const HEADER_LEN: usize = 4;

pub const KIND_SET: u8 = b'W';
pub const KIND_QUERY: u8 = b'Q';
pub const KIND_RESPONSE: u8 = b'R';
pub const KIND_INFO: u8 = b'I';
pub const KIND_NETWORK_INFO: u8 = b'N';
pub const KIND_SCAN_COMPLETE: u8 = b'S';

/// Dispatcher operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgOp {
    Set,
    Get,
}

fn class_of(id: WidId) -> Result<WidClass> {
    id.class()
        .ok_or_else(|| Error::InvalidArgument(format!("{id:?} has no wire class")))
}

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn finish(mut frame: Vec<u8>) -> Result<Vec<u8>> {
    let len = u16::try_from(frame.len())
        .map_err(|_| Error::InvalidArgument(format!("config frame of {} bytes", frame.len())))?;
    frame[2..4].copy_from_slice(&len.to_le_bytes());
    Ok(frame)
}

fn put_sized(frame: &mut Vec<u8>, id: WidId, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| Error::InvalidArgument(format!("{id:?} value of {} bytes", data.len())))?;
    frame.extend_from_slice(&id.raw().to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(data);
    Ok(())
}

fn put_scalar(frame: &mut Vec<u8>, id: WidId, val: &[u8], width: usize) -> Result<()> {
    if val.len() < width {
        return Err(Error::InvalidArgument(format!(
            "{id:?} needs {width} value bytes, got {}",
            val.len()
        )));
    }
    put_sized(frame, id, &val[..width])
}

/// Encodes a SET frame carrying every attribute in `wids`.
pub fn encode_set(seq: u8, wids: &[Wid]) -> Result<Vec<u8>> {
    let body: usize = wids.iter().map(|w| w.size() + 5).sum();
    let mut frame = crate::try_buffer(HEADER_LEN + body, "config frame")?;
    frame.extend_from_slice(&[KIND_SET, seq, 0, 0]);
    for wid in wids {
        match class_of(wid.id)? {
            WidClass::Char => put_scalar(&mut frame, wid.id, &wid.val, 1)?,
            WidClass::Short => put_scalar(&mut frame, wid.id, &wid.val, 2)?,
            WidClass::Int => put_scalar(&mut frame, wid.id, &wid.val, 4)?,
            WidClass::Str => put_sized(&mut frame, wid.id, &wid.val)?,
            WidClass::Bin => {
                put_sized(&mut frame, wid.id, &wid.val)?;
                frame.push(checksum(&wid.val));
            }
        }
    }
    finish(frame)
}

/// Encodes a GET frame: one id per attribute.
pub fn encode_query(seq: u8, wids: &[Wid]) -> Result<Vec<u8>> {
    let mut frame = crate::try_buffer(HEADER_LEN + wids.len() * 2, "config frame")?;
    frame.extend_from_slice(&[KIND_QUERY, seq, 0, 0]);
    for wid in wids {
        frame.extend_from_slice(&wid.id.raw().to_le_bytes());
    }
    finish(frame)
}

/// Splits a body of `[id, len, bytes(, checksum)]` entries.
fn split_entries(body: &[u8]) -> Result<Vec<(WidId, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut rest = body;
    while rest.len() >= 4 {
        let id = WidId(u16::from_le_bytes([rest[0], rest[1]]));
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        let trailer = usize::from(id.class() == Some(WidClass::Bin));
        let end = 4 + len + trailer;
        if rest.len() < end {
            return Err(Error::Transport(format!("truncated entry for {id:?}")));
        }
        let data = &rest[4..4 + len];
        if trailer == 1 && rest[4 + len] != checksum(data) {
            return Err(Error::Transport(format!("bad checksum for {id:?}")));
        }
        out.push((id, data.to_vec()));
        rest = &rest[end..];
    }
    Ok(out)
}

fn body_of(frame: &[u8], kind: u8) -> Result<&[u8]> {
    if frame.len() < HEADER_LEN || frame[0] != kind {
        return Err(Error::Transport(format!(
            "expected '{}' frame",
            char::from(kind)
        )));
    }
    let len = u16::from_le_bytes([frame[2], frame[3]]) as usize;
    if len < HEADER_LEN || len > frame.len() {
        return Err(Error::Transport(format!("frame length {len} out of range")));
    }
    Ok(&frame[HEADER_LEN..len])
}

/// Fills GET descriptors from a response frame. Every descriptor ends up sized
/// to what the firmware returned; one it did not answer is left empty.
pub fn parse_response(frame: &[u8], wids: &mut [Wid]) -> Result<()> {
    let answers = split_entries(body_of(frame, KIND_RESPONSE)?)?;
    for wid in wids.iter_mut() {
        match answers.iter().find(|(id, _)| *id == wid.id) {
            Some((_, data)) => wid.fill(data),
            None => {
                tracing::debug!(wid = ?wid.id, "attribute not answered");
                wid.val.clear();
            }
        }
    }
    for (id, _) in answers.iter().filter(|(id, _)| !wids.iter().any(|w| w.id == *id)) {
        tracing::debug!(wid = ?id, "unsolicited attribute in response");
    }
    Ok(())
}

/// Decoded request, as the firmware side sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub op: CfgOp,
    pub seq: u8,
    pub wids: Vec<(WidId, Vec<u8>)>,
}

/// Parses a SET or GET frame produced by [`encode_set`] / [`encode_query`].
pub fn decode_request(frame: &[u8]) -> Result<Request> {
    let kind = frame.first().copied().unwrap_or_default();
    match kind {
        KIND_SET => {
            let body = body_of(frame, KIND_SET)?;
            Ok(Request { op: CfgOp::Set, seq: frame[1], wids: split_entries(body)? })
        }
        KIND_QUERY => {
            let body = body_of(frame, KIND_QUERY)?;
            let wids = body
                .chunks_exact(2)
                .map(|c| (WidId(u16::from_le_bytes([c[0], c[1]])), Vec::new()))
                .collect();
            Ok(Request { op: CfgOp::Get, seq: frame[1], wids })
        }
        other => Err(Error::Transport(format!("unknown request kind {other:#04x}"))),
    }
}

/// Builds an `'R'` frame answering the given attributes.
pub fn encode_response(seq: u8, answers: &[(WidId, Vec<u8>)]) -> Result<Vec<u8>> {
    let body: usize = answers.iter().map(|(_, d)| d.len() + 5).sum();
    let mut frame = crate::try_buffer(HEADER_LEN + body, "response frame")?;
    frame.extend_from_slice(&[KIND_RESPONSE, seq, 0, 0]);
    for (id, data) in answers {
        put_sized(&mut frame, *id, data)?;
        if id.class() == Some(WidClass::Bin) {
            frame.push(checksum(data));
        }
    }
    finish(frame)
}
