//! Thin wrapper over the OS return-address back-trace primitive.
//!
//! Frame storage is caller-provided so the hot capture path never touches
//! the allocator.
//!
//! Skip accounting: this function always hides its own frame; `skip` is the
//! number of additional frames above it to hide. Every function between the
//! user's code and this one must be `#[inline(never)]` and accounted for in
//! `skip`, otherwise the capture either shows recorder internals or eats a
//! real caller frame.

use stackreel_common::MAX_FRAMES;

/// Capture the current thread's return-address stack into `out`, innermost
/// frame first. Hides its own frame plus `skip` more above it, so with
/// `skip = 0` the first recorded frame is this function's caller. Returns
/// the number of frames written.
#[cfg(windows)]
#[inline(never)]
pub fn capture_frames(skip: u32, out: &mut [u64; MAX_FRAMES]) -> usize {
    use std::ffi::c_void;
    use std::ptr;

    // Exported by ntdll but absent from the usual import libraries, so it is
    // declared here directly.
    extern "system" {
        fn RtlCaptureStackBackTrace(
            FramesToSkip: u32,
            FramesToCapture: u32,
            BackTrace: *mut *mut c_void,
            BackTraceHash: *mut u32,
        ) -> u16;
    }

    let mut raw = [ptr::null_mut::<c_void>(); MAX_FRAMES];
    let count = unsafe {
        RtlCaptureStackBackTrace(
            skip + 1,
            MAX_FRAMES as u32,
            raw.as_mut_ptr(),
            ptr::null_mut(),
        )
    } as usize;
    for (slot, addr) in out.iter_mut().zip(&raw[..count]) {
        *slot = *addr as u64;
    }
    count
}

/// Capture is a Windows facility; elsewhere a capture records an empty
/// stack, which the wire format and player both accept.
#[cfg(not(windows))]
pub fn capture_frames(_skip: u32, _out: &mut [u64; MAX_FRAMES]) -> usize {
    0
}
