//! Export of the resolved callstack stream.
//!
//! Currently supports Chrome Trace Event Format for visualization in
//! Perfetto, Speedscope or chrome://tracing.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
