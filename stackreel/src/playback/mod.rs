//! The offline player.
//!
//! Replays an event log produced by the recorder: module events rebuild the
//! recording-time address map and drive the symbol source, callstack events
//! are resolved frame by frame and handed to the consumer callback in log
//! order. Replay stops cleanly at the first short read (the recorder's
//! buffer may have been cut off mid-record) and fails only on an
//! unrecognized tag.

pub mod module_map;
pub mod symbols;

#[cfg(windows)]
pub mod dbghelp;

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, warn};
use stackreel_common::{read_record, Event};

use crate::domain::{ModuleRange, ReplayError, Timestamp};
use module_map::{ModuleEntry, ModuleMap};

pub use symbols::{NullSymbolSource, SymbolInfo, SymbolSource};

#[cfg(windows)]
pub use dbghelp::DbgHelpSource;

/// First synthetic base handed to the symbol source: above any plausible
/// natural module base, so re-loaded modules never collide with each other
/// even when several recorded modules shared a base across their lifetimes.
pub const INITIAL_SYNTHETIC_BASE: u64 = 0x1_0000_0000;

/// One frame of a replayed callstack. `module` and `symbol` are absent when
/// the address matched no live module, or when the module's symbols could
/// not be loaded; consumers must tolerate a bare address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub address: u64,
    pub module: Option<String>,
    pub symbol: Option<SymbolInfo>,
}

impl ResolvedFrame {
    fn unresolved(address: u64) -> Self {
        ResolvedFrame {
            address,
            module: None,
            symbol: None,
        }
    }

    /// Multi-line display of one frame, viewer-style.
    pub fn format(&self, frame_num: usize) -> String {
        let mut out = format!("#{frame_num:<3} 0x{:016x}", self.address);
        if let Some(symbol) = &self.symbol {
            out.push(' ');
            out.push_str(&symbol.name);
            if let Some(file) = &symbol.file {
                out.push_str(&format!("\n      at {file}"));
                if let Some(line) = symbol.line {
                    out.push_str(&format!(":{line}"));
                }
            }
        }
        if let Some(module) = &self.module {
            out.push_str(&format!("\n      in {module}"));
        }
        out
    }
}

/// Totals for one replay, for logging and the viewer's summary line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub records: u64,
    pub callstacks: u64,
    pub modules_loaded: u64,
    pub modules_failed: u64,
}

impl fmt::Display for ReplayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records, {} callstacks, {} modules ({} without symbols)",
            self.records, self.callstacks, self.modules_loaded, self.modules_failed
        )
    }
}

/// The replay driver: decodes the log, maintains the module map, resolves
/// frames through a [`SymbolSource`] at synthetic bases.
pub struct Player<S: SymbolSource> {
    source: S,
    modules: ModuleMap,
    next_base: u64,
}

impl<S: SymbolSource> Player<S> {
    pub fn new(source: S) -> Self {
        Player {
            source,
            modules: ModuleMap::new(),
            next_base: INITIAL_SYNTHETIC_BASE,
        }
    }

    /// Replay a log file. See [`replay`](Self::replay).
    pub fn replay_file<P, F>(&mut self, path: P, callback: F) -> Result<ReplayStats, ReplayError>
    where
        P: AsRef<Path>,
        F: FnMut(Timestamp, &[ResolvedFrame]),
    {
        let file = File::open(path.as_ref()).map_err(|source| ReplayError::Open {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        self.replay(BufReader::new(file), callback)
    }

    /// Drive the stream to completion, invoking `callback` once per
    /// callstack record with the record's timestamp and its frames in
    /// innermost-to-outermost order. A short read ends replay cleanly (all
    /// callbacks already delivered remain valid); an unrecognized tag
    /// aborts with an error because the stream is no longer trustworthy.
    pub fn replay<R, F>(&mut self, mut reader: R, mut callback: F) -> Result<ReplayStats, ReplayError>
    where
        R: Read,
        F: FnMut(Timestamp, &[ResolvedFrame]),
    {
        let mut stats = ReplayStats::default();
        while let Some(record) = read_record(&mut reader)? {
            stats.records += 1;
            match record.event {
                Event::AddModule { path, base, size } => {
                    self.add_module(path, base, size, &mut stats);
                }
                Event::DelModule { path } => {
                    if self.modules.remove_by_path(&path).is_none() {
                        debug!("unload of untracked module {path}");
                    }
                }
                Event::Callstack { frames } => {
                    let resolved: Vec<ResolvedFrame> = frames
                        .iter()
                        .map(|&addr| self.resolve_frame(addr))
                        .collect();
                    callback(Timestamp(record.timestamp_ns), &resolved);
                    stats.callstacks += 1;
                }
            }
        }
        Ok(stats)
    }

    fn add_module(
        &mut self,
        path: stackreel_common::WidePath,
        base: u64,
        size: u32,
        stats: &mut ReplayStats,
    ) {
        let relocated_base = self.source.load_module(&path, self.next_base, size);
        match relocated_base {
            Some(relocated) => {
                debug!("loaded {path} at synthetic base 0x{relocated:x}");
                self.next_base += u64::from(size);
                stats.modules_loaded += 1;
            }
            None => {
                warn!("no symbols for {path}; its frames will stay raw");
                stats.modules_failed += 1;
            }
        }
        self.modules.insert(ModuleEntry {
            path,
            range: ModuleRange::new(base, size),
            relocated_base,
        });
    }

    fn resolve_frame(&mut self, addr: u64) -> ResolvedFrame {
        let Some(entry) = self.modules.lookup(addr) else {
            return ResolvedFrame::unresolved(addr);
        };
        let Some(relocated) = entry.relocated_base else {
            return ResolvedFrame::unresolved(addr);
        };
        let module = entry.path.to_string_lossy();
        let offset = addr - entry.range.base;
        let symbol = self.source.locate(relocated + offset);
        ResolvedFrame {
            address: addr,
            module: Some(module),
            symbol,
        }
    }

    /// Release the symbol source (and with it any OS-side session).
    pub fn end(self) -> S {
        self.source
    }
}
