//! The in-process recorder.
//!
//! A [`Recorder`] owns the event buffer, the capture path and the module
//! tracker behind one process-wide lock. It is inert until the first
//! [`capture`](Recorder::capture): bootstrap then allocates the buffer,
//! records every already-loaded module and subscribes to loader
//! notifications. From that point every user thread plus the OS loader
//! thread append records under the lock; [`dump`](Recorder::dump) writes
//! the accumulated prefix to disk in one shot.
//!
//! Records are appended atomically: a record that does not fit in the
//! remaining buffer is dropped whole and recording continues. Timestamps
//! are taken inside the critical section, so accepted records carry
//! non-decreasing timestamps in log order.

pub mod sink;

mod backtrace;
mod loader;

use std::fs;
use std::path::Path;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use stackreel_common::{wire, DEFAULT_CAPACITY, MAX_FRAMES};

use crate::domain::RecordError;
use loader::LoaderHook;
use sink::RingSink;

/// The process-wide recorder instance.
static RECORDER: Recorder = Recorder::new(DEFAULT_CAPACITY);

/// The process-wide recorder. Capture sites and the loader callback all
/// funnel through this one instance.
pub fn recorder() -> &'static Recorder {
    &RECORDER
}

/// Capture the calling thread's stack into the process-wide recorder. The
/// first recorded frame is this function's caller.
#[inline(never)]
pub fn capture() {
    // This wrapper adds one frame between the caller and the recorder.
    RECORDER.capture_with_skip(1);
}

/// Dump the process-wide recorder's buffer to `path`.
pub fn dump<P: AsRef<Path>>(path: P) -> Result<usize, RecordError> {
    RECORDER.dump(path)
}

/// Tear down the process-wide recorder: unregister the loader callback,
/// then release the buffer. Call before the host starts unloading the
/// world; captures after this are ignored.
pub fn shutdown() {
    RECORDER.shutdown();
}

enum State {
    /// Nothing allocated, nothing registered. Capture bootstraps.
    Idle,
    /// Buffer live, enumeration done, loader callback registered (when the
    /// notification API could be resolved).
    Active(Active),
    /// Torn down. Terminal: capture and dump become no-ops.
    Torn,
}

struct Active {
    sink: RingSink,
    /// Epoch for record timestamps; monotonic, private to this run.
    epoch: Instant,
    hook: Option<LoaderHook>,
}

impl Active {
    fn timestamp(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Call-stack recorder: bounded buffer, explicit capture, one dump.
///
/// The embedded constructor [`with_capacity`](Recorder::with_capacity)
/// exists for tests and special hosts; normal use goes through the
/// process-wide instance via [`capture`]/[`dump`]/[`shutdown`], which is
/// also the only instance that tracks loader notifications.
pub struct Recorder {
    capacity: usize,
    inner: Mutex<State>,
}

impl Recorder {
    const fn new(capacity: usize) -> Self {
        Recorder {
            capacity,
            inner: Mutex::new(State::Idle),
        }
    }

    /// A standalone recorder with a custom buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Recorder::new(capacity)
    }

    /// A poisoned lock means some thread panicked mid-append; the cursor is
    /// still consistent (it only moves after a complete record), so keep
    /// recording.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture the calling thread's return-address stack and append one
    /// callstack record. The first recorded frame is this method's caller.
    /// Bootstraps on first use; does nothing after
    /// [`shutdown`](Recorder::shutdown).
    #[inline(never)]
    pub fn capture(&self) {
        self.capture_with_skip(1);
    }

    /// Capture with `wrapper_frames` caller-side frames hidden, for
    /// wrappers that sit between user code and the recorder: a direct call
    /// with 0 starts the stack at this method's caller, and each wrapper in
    /// between adds one. Every function on this path stays
    /// `#[inline(never)]` so the skip arithmetic sees the frames it counts.
    #[inline(never)]
    pub fn capture_with_skip(&self, wrapper_frames: u32) {
        let mut frames = [0u64; MAX_FRAMES];
        let count = backtrace::capture_frames(wrapper_frames + 1, &mut frames);
        self.record_frames(&frames[..count]);
    }

    /// Append one callstack record with the given frames.
    pub(crate) fn record_frames(&self, frames: &[u64]) {
        let mut state = self.lock();
        if let State::Idle = *state {
            *state = State::Active(self.bootstrap());
        }
        let State::Active(active) = &mut *state else {
            return;
        };
        let timestamp = active.timestamp();
        if let Some(len) = wire::encode_callstack(timestamp, frames, active.sink.tail()) {
            active.sink.commit(len);
        }
    }

    /// Build the active state: allocate the buffer, record the modules that
    /// are already loaded, then subscribe to loader notifications. Runs
    /// under the recorder lock, before the first capture record is written,
    /// so enumeration records precede any callstack the host can cause.
    fn bootstrap(&self) -> Active {
        let mut active = Active {
            sink: RingSink::new(self.capacity),
            epoch: Instant::now(),
            hook: None,
        };
        for module in loader::enumerate_modules() {
            let timestamp = active.timestamp();
            if let Some(len) = wire::encode_add_module(
                timestamp,
                &module.path,
                module.base,
                module.size,
                active.sink.tail(),
            ) {
                active.sink.commit(len);
            }
        }
        // Only the process-wide instance owns the (single) notification
        // callback; standalone recorders run enumeration-only.
        if ptr::eq(self, &RECORDER) {
            active.hook = LoaderHook::register();
        }
        active
    }

    /// Loader callback: a module was mapped in. Appends without allocating;
    /// the path slice still belongs to ntdll.
    pub(crate) fn on_module_loaded(&self, path: &[u16], base: u64, size: u32) {
        let mut state = self.lock();
        let State::Active(active) = &mut *state else {
            return;
        };
        let timestamp = active.timestamp();
        if let Some(len) = wire::encode_add_module(timestamp, path, base, size, active.sink.tail())
        {
            active.sink.commit(len);
        }
    }

    /// Loader callback: a module was unmapped.
    pub(crate) fn on_module_unloaded(&self, path: &[u16]) {
        let mut state = self.lock();
        let State::Active(active) = &mut *state else {
            return;
        };
        let timestamp = active.timestamp();
        if let Some(len) = wire::encode_del_module(timestamp, path, active.sink.tail()) {
            active.sink.commit(len);
        }
    }

    /// Write the accepted prefix of the buffer to `path`, verbatim, under
    /// the recorder lock. Returns the number of bytes written; `Ok(0)`
    /// without touching the filesystem when nothing has been recorded.
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<usize, RecordError> {
        let state = self.lock();
        let State::Active(active) = &*state else {
            return Ok(0);
        };
        fs::write(path.as_ref(), active.sink.contents()).map_err(|source| RecordError::Dump {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Ok(active.sink.len())
    }

    /// Unregister the loader callback, then release the buffer.
    ///
    /// The callback is taken out under the lock but unregistered outside
    /// it: unregistration waits for in-flight notifications, and those
    /// notifications take the lock to append. Records arriving in the
    /// window between the two steps still land in the buffer; after
    /// unregistration returns the state goes terminal.
    pub fn shutdown(&self) {
        let hook = match &mut *self.lock() {
            State::Active(active) => active.hook.take(),
            _ => None,
        };
        if let Some(hook) = hook {
            hook.unregister();
        }
        let mut state = self.lock();
        if let State::Active(_) = *state {
            *state = State::Torn;
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackreel_common::{read_record, Event};
    use std::io::Cursor;

    fn decode_all(recorder: &Recorder) -> Vec<stackreel_common::Record> {
        let file = tempfile::NamedTempFile::new().unwrap();
        let written = recorder.dump(file.path()).unwrap();
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(bytes.len(), written);

        let mut cursor = Cursor::new(bytes);
        let mut records = Vec::new();
        while let Some(record) = read_record(&mut cursor).unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn dump_before_first_capture_is_a_no_op() {
        let recorder = Recorder::with_capacity(1024);
        let path = std::env::temp_dir().join("stackreel-never-created.bin");
        assert_eq!(recorder.dump(&path).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn buffer_prefix_is_always_a_valid_event_stream() {
        let recorder = Recorder::with_capacity(4096);
        recorder.record_frames(&[0x1000, 0x2000]);
        recorder.on_module_loaded(&[b'a' as u16], 0x4000_0000, 0x1000);
        recorder.record_frames(&[]);
        recorder.on_module_unloaded(&[b'a' as u16]);

        let records = decode_all(&recorder);
        assert_eq!(records.len(), 4);
        assert!(matches!(records[0].event, Event::Callstack { .. }));
        assert!(matches!(records[1].event, Event::AddModule { .. }));
        assert!(matches!(records[2].event, Event::Callstack { ref frames } if frames.is_empty()));
        assert!(matches!(records[3].event, Event::DelModule { .. }));
    }

    #[test]
    fn oversized_record_is_dropped_whole_and_recording_continues() {
        // Capacity 64: a 7-frame callstack (67 bytes) must be rejected,
        // a 3-frame one (35 bytes) must then land intact.
        let recorder = Recorder::with_capacity(64);
        recorder.record_frames(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70]);
        recorder.record_frames(&[0x1, 0x2, 0x3]);

        let records = decode_all(&recorder);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].event,
            Event::Callstack {
                frames: vec![0x1, 0x2, 0x3]
            }
        );
    }

    #[test]
    fn timestamps_are_non_decreasing_across_threads() {
        let recorder = Recorder::with_capacity(DEFAULT_CAPACITY);
        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for i in 0..1000u64 {
                        recorder.record_frames(&[i]);
                    }
                });
            }
        });

        let records = decode_all(&recorder);
        assert_eq!(records.len(), 2000);
        let mut last = 0;
        for record in &records {
            assert!(matches!(record.event, Event::Callstack { .. }));
            assert!(record.timestamp_ns >= last);
            last = record.timestamp_ns;
        }
    }

    #[test]
    fn capture_after_shutdown_is_ignored() {
        let recorder = Recorder::with_capacity(1024);
        recorder.record_frames(&[0x1]);
        recorder.shutdown();
        recorder.record_frames(&[0x2]);

        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(recorder.dump(file.path()).unwrap(), 0);
    }

    #[test]
    fn dump_can_run_repeatedly_while_active() {
        let recorder = Recorder::with_capacity(1024);
        recorder.record_frames(&[0x1]);
        let file = tempfile::NamedTempFile::new().unwrap();
        let first = recorder.dump(file.path()).unwrap();
        recorder.record_frames(&[0x2]);
        let second = recorder.dump(file.path()).unwrap();
        assert!(second > first);
    }
}
