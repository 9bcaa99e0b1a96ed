//! C ABI over the process-wide recorder.
//!
//! Lets a non-Rust host link the recorder (as a static or dynamic library)
//! and drive it with three calls:
//!
//! ```c
//! void     stackreel_capture(void);
//! bool     stackreel_dump(const uint16_t *path, size_t path_len);
//! void     stackreel_shutdown(void);
//! ```
//!
//! `stackreel_capture` is safe from any thread, including DllMain-adjacent
//! code: it bootstraps lazily on first use and appends without allocating.
//! Call `stackreel_shutdown` before the host tears the process down so the
//! loader-notification callback is unregistered first.

use std::path::PathBuf;

/// Capture the calling thread's stack into the process-wide recorder. The
/// first recorded frame is this function's caller.
#[no_mangle]
pub extern "C" fn stackreel_capture() {
    // This shim adds one frame between the host and the recorder.
    stackreel::recording::recorder().capture_with_skip(1);
}

/// Dump the recorded event log to the UTF-16 path `path[..path_len]`
/// (no terminator expected). Returns false when the path is null or the
/// write fails; an idle recorder dumps nothing and reports success.
///
/// # Safety
///
/// `path` must point to `path_len` readable `u16` values.
#[no_mangle]
pub unsafe extern "C" fn stackreel_dump(path: *const u16, path_len: usize) -> bool {
    if path.is_null() {
        return false;
    }
    let units = std::slice::from_raw_parts(path, path_len);

    #[cfg(windows)]
    let path = {
        use std::os::windows::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_wide(units))
    };
    #[cfg(not(windows))]
    let path = PathBuf::from(String::from_utf16_lossy(units));

    stackreel::recording::dump(&path).is_ok()
}

/// Unregister the loader callback and release the buffer. Captures after
/// this are ignored.
#[no_mangle]
pub extern "C" fn stackreel_shutdown() {
    stackreel::recording::shutdown();
}
