//! Shared data structures between the stackreel recorder and player.
//!
//! The recorder half runs inside an arbitrary native process and appends
//! records to a fixed buffer; the player half decodes the dumped buffer
//! offline. Both sides meet at the types and wire format defined here.

use std::fmt;

pub mod wire;

pub use wire::{read_record, DecodeError};

/// Maximum number of return addresses captured per callstack record.
pub const MAX_FRAMES: usize = 200;

/// Maximum module path length, in UTF-16 code units, the recorder will emit.
pub const MAX_PATH_UNITS: usize = 1024;

/// Default recorder buffer capacity (1 MiB).
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// A module path as it travels on the wire: raw UTF-16 code units.
///
/// Windows module paths are natively UTF-16 and are recorded verbatim, with
/// no terminator and no validation. Display is lossy by design; equality and
/// map removal compare code units exactly.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct WidePath(Vec<u16>);

impl WidePath {
    pub fn new(units: Vec<u16>) -> Self {
        WidePath(units)
    }

    pub fn units(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy conversion for display and export.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

impl From<&str> for WidePath {
    fn from(s: &str) -> Self {
        WidePath(s.encode_utf16().collect())
    }
}

impl fmt::Display for WidePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl fmt::Debug for WidePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WidePath({:?})", self.to_string_lossy())
    }
}

/// Event payload of a single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A module became visible: startup enumeration or a dynamic load.
    AddModule {
        path: WidePath,
        base: u64,
        size: u32,
    },
    /// A module was unloaded.
    DelModule { path: WidePath },
    /// One captured callstack, innermost frame first.
    Callstack { frames: Vec<u64> },
}

/// A timestamped record as it appears in the event log.
///
/// Timestamps are nanoseconds on a monotonic clock whose epoch is private to
/// the recording process; only their ordering carries meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp_ns: u64,
    pub event: Event,
}

impl Record {
    /// Exact size of this record on the wire, in bytes.
    pub fn encoded_len(&self) -> usize {
        match &self.event {
            Event::AddModule { path, .. } => wire::add_module_len(path.len()),
            Event::DelModule { path } => wire::del_module_len(path.len()),
            Event::Callstack { frames } => wire::callstack_len(frames.len()),
        }
    }

    /// Encode to wire bytes. `None` if a length field would overflow `u16`.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; self.encoded_len()];
        let written = match &self.event {
            Event::AddModule { path, base, size } => {
                wire::encode_add_module(self.timestamp_ns, path.units(), *base, *size, &mut buf)
            }
            Event::DelModule { path } => {
                wire::encode_del_module(self.timestamp_ns, path.units(), &mut buf)
            }
            Event::Callstack { frames } => {
                wire::encode_callstack(self.timestamp_ns, frames, &mut buf)
            }
        }?;
        debug_assert_eq!(written, buf.len());
        Some(buf)
    }
}
