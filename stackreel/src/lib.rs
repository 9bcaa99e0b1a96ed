//! # stackreel - record call stacks now, make sense of them later
//!
//! stackreel is a two-stage pipeline for Windows processes. A recorder
//! linked into the target captures raw return-address stacks on demand,
//! tracks every module the loader maps in or out, and appends everything to
//! a fixed in-memory buffer that is dumped to disk once, at the end of the
//! run. A player later replays that dump offline, rebuilds the module
//! address map as it existed during recording, resolves each raw address
//! through the platform debug-help library, and streams fully symbolicated
//! stacks to a caller-supplied callback.
//!
//! ```text
//! target process                              analysis host
//! ┌──────────────────────────────┐            ┌──────────────────────────────┐
//! │ user threads      loader     │            │ Player                       │
//! │   capture()       callbacks  │            │   decode ──▶ ModuleMap       │
//! │      │               │       │            │      │           │           │
//! │      ▼               ▼       │  dump(..)  │      ▼           ▼           │
//! │ ┌──────────────────────────┐ │ ─────────▶ │  callstack ──▶ SymbolSource  │
//! │ │ ring sink (1 MiB, mutex) │ │  log file  │      │        (dbghelp)      │
//! │ └──────────────────────────┘ │            │      ▼                       │
//! └──────────────────────────────┘            │  callback(ts, frames)        │
//!                                             └──────────────────────────────┘
//! ```
//!
//! ## Module structure
//!
//! - [`recording`]: the in-process half - ring buffer sink, stack capture,
//!   module lifecycle tracking, and the process-wide recorder facade
//! - [`playback`]: the offline half - event decoding, the recording-time
//!   module map, symbol resolution at synthetic bases, the replay driver
//! - [`analysis`]: capture-site aggregation over the replayed stream
//! - [`export`]: Chrome Trace Event Format export of the resolved stream
//! - [`domain`]: shared newtypes and structured errors
//! - [`cli`]: argument parsing for the `stackreel` viewer binary
//!
//! The wire format and event model live in the `stackreel-common` crate,
//! shared with the C-ABI shim in `stackreel-ffi`.
//!
//! ## Capture model
//!
//! Capture is explicit: the host calls [`recording::capture`] wherever a
//! stack is interesting. There is no sampling timer and no worker thread;
//! the only I/O happens inside [`recording::dump`]. A capture that does not
//! fit in the remaining buffer is dropped whole, so the log on disk is
//! always a valid prefix of complete records.

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod playback;
pub mod recording;

pub use stackreel_common::{DecodeError, Event, Record, WidePath};

pub use domain::{ModuleRange, Timestamp};
pub use playback::{Player, ReplayStats, ResolvedFrame, SymbolInfo, SymbolSource};
pub use recording::Recorder;
