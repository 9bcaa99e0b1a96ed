//! dbghelp-backed symbol source.
//!
//! One `DbgHelpSource` is one dbghelp session, keyed by a process-unique
//! pseudo-handle (dbghelp only uses the value as a session key; it does not
//! have to be a real process handle). The session is configured to load
//! symbols eagerly together with line information, to ignore the ambient
//! `_NT_SYMBOL_PATH`, and to undecorate names.
//!
//! All dbghelp calls are single-threaded by contract; the player is
//! single-threaded, so no extra locking is needed here.

use std::io;
use std::mem;
use std::process;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use winapi::shared::basetsd::DWORD64;
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::ntdef::PWSTR;
use winapi::um::dbghelp::{
    SymCleanup, SymFromAddrW, SymGetLineFromAddrW64, SymGetOptions, SymInitializeW,
    SymLoadModuleExW, SymSetOptions, IMAGEHLP_LINEW64, SYMBOL_INFOW, SYMOPT_DEFERRED_LOADS,
    SYMOPT_IGNORE_NT_SYMPATH, SYMOPT_LOAD_LINES, SYMOPT_UNDNAME,
};
use winapi::um::winnt::HANDLE;

use stackreel_common::WidePath;

use super::symbols::{SymbolInfo, SymbolSource};

const MAX_SYMBOL_CHARS: usize = 256;

/// SYMBOL_INFOW with room for an actual name after the one-element array
/// the header declares.
#[repr(C)]
struct SymbolBuffer {
    info: SYMBOL_INFOW,
    _name: [u16; MAX_SYMBOL_CHARS],
}

/// A symbol session unique to this process: every concurrent player gets
/// its own key, so their module address spaces never collide inside
/// dbghelp.
fn next_session_key() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    let counter = NEXT.fetch_add(1, Ordering::Relaxed);
    (u64::from(process::id()) << 32) | counter
}

/// Debug-help session implementing [`SymbolSource`].
pub struct DbgHelpSource {
    session: HANDLE,
    open: bool,
}

impl DbgHelpSource {
    /// Initialize a fresh dbghelp session: eager loads, line numbers,
    /// `_NT_SYMBOL_PATH` suppressed, undecorated names.
    pub fn new() -> io::Result<Self> {
        let session = next_session_key() as usize as HANDLE;
        unsafe {
            let options = (SymGetOptions() & !SYMOPT_DEFERRED_LOADS)
                | SYMOPT_LOAD_LINES
                | SYMOPT_IGNORE_NT_SYMPATH
                | SYMOPT_UNDNAME;
            SymSetOptions(options);
            if SymInitializeW(session, ptr::null(), FALSE) == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(DbgHelpSource {
            session,
            open: true,
        })
    }

    /// Release the session. Returns false if dbghelp refused the cleanup.
    pub fn close(mut self) -> bool {
        self.open = false;
        unsafe { SymCleanup(self.session) != 0 }
    }
}

impl Drop for DbgHelpSource {
    fn drop(&mut self) {
        if self.open {
            unsafe {
                SymCleanup(self.session);
            }
        }
    }
}

impl SymbolSource for DbgHelpSource {
    fn load_module(&mut self, path: &WidePath, base: u64, size: u32) -> Option<u64> {
        let mut wide: Vec<u16> = path.units().to_vec();
        wide.push(0);
        let loaded = unsafe {
            SymLoadModuleExW(
                self.session,
                ptr::null_mut(),
                wide.as_ptr(),
                ptr::null(),
                base,
                size,
                ptr::null_mut(),
                0,
            )
        };
        if loaded == 0 {
            None
        } else {
            Some(loaded)
        }
    }

    fn locate(&mut self, addr: u64) -> Option<SymbolInfo> {
        unsafe {
            let mut buffer: SymbolBuffer = mem::zeroed();
            buffer.info.SizeOfStruct = mem::size_of::<SYMBOL_INFOW>() as DWORD;
            buffer.info.MaxNameLen = MAX_SYMBOL_CHARS as DWORD;
            let mut displacement: DWORD64 = 0;
            if SymFromAddrW(self.session, addr, &mut displacement, &mut buffer.info) == 0 {
                return None;
            }
            let name_len = (buffer.info.NameLen as usize).min(MAX_SYMBOL_CHARS);
            let name =
                String::from_utf16_lossy(slice::from_raw_parts(buffer.info.Name.as_ptr(), name_len));

            let mut line: IMAGEHLP_LINEW64 = mem::zeroed();
            line.SizeOfStruct = mem::size_of::<IMAGEHLP_LINEW64>() as DWORD;
            let mut line_displacement: DWORD = 0;
            let (file, line_number) = if SymGetLineFromAddrW64(
                self.session,
                addr,
                &mut line_displacement,
                &mut line,
            ) != 0
            {
                (Some(wide_cstr(line.FileName)), Some(line.LineNumber))
            } else {
                (None, None)
            };

            Some(SymbolInfo {
                name,
                file,
                line: line_number,
            })
        }
    }
}

/// Copy a NUL-terminated UTF-16 string owned by dbghelp.
unsafe fn wide_cstr(ptr: PWSTR) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(slice::from_raw_parts(ptr, len))
}
