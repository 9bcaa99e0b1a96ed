//! Binary wire format for the event log.
//!
//! Every record is `tag (1B) | timestamp (8B LE)` followed by a tag-specific
//! body, tightly packed with no alignment padding:
//!
//! | tag | body |
//! |-----|------|
//! | 0 `add_module` | `path_len: u16`, `path_len × u16` UTF-16 units, `base: u64`, `size: u32` |
//! | 1 `del_module` | `path_len: u16`, `path_len × u16` UTF-16 units |
//! | 2 `callstack`  | `frame_count: u16`, `frame_count × u64` frames |
//!
//! The stream has no header and no footer. A short read anywhere — including
//! mid-record — signals end of available data, not corruption; only an
//! unrecognized tag is fatal.
//!
//! The `encode_*` functions write into a caller-provided scratch slice and
//! never allocate, so the recorder can use them under its lock and from
//! inside loader-notification callbacks.

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::{Event, Record, WidePath};

pub const TAG_ADD_MODULE: u8 = 0;
pub const TAG_DEL_MODULE: u8 = 1;
pub const TAG_CALLSTACK: u8 = 2;

/// Tag byte plus timestamp.
const HEADER_LEN: usize = 1 + 8;

pub fn add_module_len(path_units: usize) -> usize {
    HEADER_LEN + 2 + path_units * 2 + 8 + 4
}

pub fn del_module_len(path_units: usize) -> usize {
    HEADER_LEN + 2 + path_units * 2
}

pub fn callstack_len(frames: usize) -> usize {
    HEADER_LEN + 2 + frames * 8
}

/// Decoding failure. Truncation is not represented here: the reader reports
/// it as a clean end of stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized event tag {0:#04x}")]
    UnknownTag(u8),
    #[error("read error in event stream")]
    Io(#[source] io::Error),
}

/// Little-endian field writer over a fixed scratch slice.
///
/// Callers check the total record size before constructing one, so the
/// individual puts cannot run past the end.
struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        FieldWriter { buf, pos: 0 }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put_u16(&mut self, v: u16) {
        self.buf[self.pos..self.pos + 2].copy_from_slice(&v.to_le_bytes());
        self.pos += 2;
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn put_u64(&mut self, v: u64) {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
    }

    fn put_header(&mut self, tag: u8, timestamp_ns: u64) {
        self.put_u8(tag);
        self.put_u64(timestamp_ns);
    }
}

/// Encode an `add_module` record into `out`. Returns the number of bytes
/// written, or `None` if the path length overflows `u16` or `out` is too
/// small to hold the whole record.
pub fn encode_add_module(
    timestamp_ns: u64,
    path: &[u16],
    base: u64,
    size: u32,
    out: &mut [u8],
) -> Option<usize> {
    if path.len() > u16::MAX as usize {
        return None;
    }
    let need = add_module_len(path.len());
    if need > out.len() {
        return None;
    }
    let mut w = FieldWriter::new(out);
    w.put_header(TAG_ADD_MODULE, timestamp_ns);
    w.put_u16(path.len() as u16);
    for &unit in path {
        w.put_u16(unit);
    }
    w.put_u64(base);
    w.put_u32(size);
    Some(need)
}

/// Encode a `del_module` record into `out`.
pub fn encode_del_module(timestamp_ns: u64, path: &[u16], out: &mut [u8]) -> Option<usize> {
    if path.len() > u16::MAX as usize {
        return None;
    }
    let need = del_module_len(path.len());
    if need > out.len() {
        return None;
    }
    let mut w = FieldWriter::new(out);
    w.put_header(TAG_DEL_MODULE, timestamp_ns);
    w.put_u16(path.len() as u16);
    for &unit in path {
        w.put_u16(unit);
    }
    Some(need)
}

/// Encode a `callstack` record into `out`, innermost frame first.
pub fn encode_callstack(timestamp_ns: u64, frames: &[u64], out: &mut [u8]) -> Option<usize> {
    if frames.len() > u16::MAX as usize {
        return None;
    }
    let need = callstack_len(frames.len());
    if need > out.len() {
        return None;
    }
    let mut w = FieldWriter::new(out);
    w.put_header(TAG_CALLSTACK, timestamp_ns);
    w.put_u16(frames.len() as u16);
    for &frame in frames {
        w.put_u64(frame);
    }
    Some(need)
}

/// Short reads become `Ok(None)`; anything else is a real I/O failure.
fn may_end<T>(res: io::Result<T>) -> Result<Option<T>, DecodeError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(DecodeError::Io(e)),
    }
}

/// Read the next record from the stream.
///
/// `Ok(None)` means the stream ended, possibly in the middle of a record —
/// the recorder's buffer can be cut off anywhere and the truncated tail is
/// simply unavailable data. `Err(DecodeError::UnknownTag)` means the stream
/// is no longer trustworthy and replay must stop.
pub fn read_record<R: Read>(r: &mut R) -> Result<Option<Record>, DecodeError> {
    let Some(tag) = may_end(r.read_u8())? else {
        return Ok(None);
    };
    let Some(timestamp_ns) = may_end(r.read_u64::<LittleEndian>())? else {
        return Ok(None);
    };

    let event = match tag {
        TAG_ADD_MODULE => {
            let Some(path) = read_path(r)? else {
                return Ok(None);
            };
            let Some(base) = may_end(r.read_u64::<LittleEndian>())? else {
                return Ok(None);
            };
            let Some(size) = may_end(r.read_u32::<LittleEndian>())? else {
                return Ok(None);
            };
            Event::AddModule { path, base, size }
        }
        TAG_DEL_MODULE => {
            let Some(path) = read_path(r)? else {
                return Ok(None);
            };
            Event::DelModule { path }
        }
        TAG_CALLSTACK => {
            let Some(count) = may_end(r.read_u16::<LittleEndian>())? else {
                return Ok(None);
            };
            let mut frames = vec![0u64; count as usize];
            let Some(()) = may_end(r.read_u64_into::<LittleEndian>(&mut frames))? else {
                return Ok(None);
            };
            Event::Callstack { frames }
        }
        other => return Err(DecodeError::UnknownTag(other)),
    };

    Ok(Some(Record {
        timestamp_ns,
        event,
    }))
}

fn read_path<R: Read>(r: &mut R) -> Result<Option<WidePath>, DecodeError> {
    let Some(len) = may_end(r.read_u16::<LittleEndian>())? else {
        return Ok(None);
    };
    let mut units = vec![0u16; len as usize];
    let Some(()) = may_end(r.read_u16_into::<LittleEndian>(&mut units))? else {
        return Ok(None);
    };
    Ok(Some(WidePath::new(units)))
}
