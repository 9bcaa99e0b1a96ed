//! Frame-skip accounting regression tests.
//!
//! The recorder's public entry points sit one or two wrapper frames above
//! the OS back-trace primitive; each layer declares the frames it adds and
//! stays `#[inline(never)]` so the arithmetic holds. These tests drive the
//! real capture path (not the internal frame-recording helper) through
//! nested calls and pin the innermost recorded frame to the actual call
//! site: a frame belonging to the recorder's own wrappers, or a swallowed
//! caller frame, fails the range checks.

#![cfg(windows)]

use std::path::Path;

use stackreel::playback::{NullSymbolSource, Player};
use stackreel::Recorder;

/// Generous upper bound on the compiled size of the probe functions below;
/// a return address recorded inside one of them must land in this window.
const FN_SPAN: u64 = 0x1000;

fn within(addr: u64, fn_addr: u64) -> bool {
    addr > fn_addr && addr < fn_addr + FN_SPAN
}

fn replay_stacks(path: &Path) -> Vec<Vec<u64>> {
    let mut player = Player::new(NullSymbolSource);
    let mut stacks: Vec<Vec<u64>> = Vec::new();
    player
        .replay_file(path, |_, frames| {
            stacks.push(frames.iter().map(|frame| frame.address).collect());
        })
        .unwrap();
    stacks
}

#[inline(never)]
fn probe_method(recorder: &Recorder) {
    recorder.capture();
    std::hint::black_box(());
}

#[inline(never)]
fn nested_method(recorder: &Recorder) {
    probe_method(recorder);
    std::hint::black_box(());
}

#[test]
fn method_capture_starts_at_its_caller() {
    let recorder = Recorder::with_capacity(512 * 1024);
    nested_method(&recorder);

    let file = tempfile::NamedTempFile::new().unwrap();
    recorder.dump(file.path()).unwrap();
    let stacks = replay_stacks(file.path());

    assert_eq!(stacks.len(), 1);
    let frames = &stacks[0];
    assert!(frames.len() >= 2, "expected a real stack, got {frames:x?}");

    let probe_addr = probe_method as fn(&Recorder) as usize as u64;
    let nested_addr = nested_method as fn(&Recorder) as usize as u64;
    assert!(
        within(frames[0], probe_addr),
        "innermost frame 0x{:x} does not return into probe_method (0x{probe_addr:x}); \
         a recorder wrapper frame is leaking into captures",
        frames[0]
    );
    assert!(
        within(frames[1], nested_addr),
        "second frame 0x{:x} does not return into nested_method (0x{nested_addr:x})",
        frames[1]
    );
}

#[inline(never)]
fn probe_free_fn() {
    stackreel::recording::capture();
    std::hint::black_box(());
}

#[inline(never)]
fn nested_free_fn() {
    probe_free_fn();
    std::hint::black_box(());
}

#[test]
fn free_function_capture_starts_at_its_caller() {
    nested_free_fn();

    let file = tempfile::NamedTempFile::new().unwrap();
    stackreel::recording::dump(file.path()).unwrap();
    let stacks = replay_stacks(file.path());

    // The process-wide recorder is shared by this whole test binary, but no
    // other test in this file captures into it.
    assert_eq!(stacks.len(), 1);
    let frames = &stacks[0];
    assert!(frames.len() >= 2, "expected a real stack, got {frames:x?}");

    let probe_addr = probe_free_fn as fn() as usize as u64;
    let nested_addr = nested_free_fn as fn() as usize as u64;
    assert!(
        within(frames[0], probe_addr),
        "innermost frame 0x{:x} does not return into probe_free_fn (0x{probe_addr:x}); \
         recording::capture's own frame is leaking into captures",
        frames[0]
    );
    assert!(
        within(frames[1], nested_addr),
        "second frame 0x{:x} does not return into nested_free_fn (0x{nested_addr:x})",
        frames[1]
    );
}
