//! Chrome Trace Event exporter.
//!
//! Each replayed callstack becomes one instant event whose args carry the
//! resolved frames, so a recorded run can be browsed on a timeline next to
//! other traces.
//! Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview

use std::collections::HashMap;
use std::io::Write;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::{ExportError, Timestamp};
use crate::playback::ResolvedFrame;

/// Chrome Trace Event format
#[derive(Debug, Clone, Serialize)]
struct ChromeTraceEvent {
    /// Event name (the innermost resolved symbol, or the raw address)
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "I" = instant
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Instant-event scope: "t" = thread
    s: String,
    pid: u32,
    tid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

#[derive(Debug, Serialize)]
struct FrameJson {
    addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
}

/// Collects replayed callstacks and writes them out as one trace document.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    /// Start timestamp for relative timing (in nanoseconds)
    start_timestamp_ns: Option<u64>,
}

impl ChromeTraceExporter {
    pub fn new() -> Self {
        ChromeTraceExporter::default()
    }

    /// Add one resolved callstack from the replay callback.
    pub fn add_callstack(&mut self, timestamp: Timestamp, frames: &[ResolvedFrame]) {
        let start = *self
            .start_timestamp_ns
            .get_or_insert(timestamp.as_nanos());
        let ts_us = timestamp.as_nanos().saturating_sub(start) as f64 / 1000.0;

        let name = frames
            .first()
            .map(|frame| match &frame.symbol {
                Some(symbol) => symbol.name.clone(),
                None => format!("0x{:x}", frame.address),
            })
            .unwrap_or_else(|| "<empty stack>".to_string());

        let frames_json: Vec<JsonValue> = frames
            .iter()
            .map(|frame| {
                serde_json::json!(FrameJson {
                    addr: format!("0x{:016x}", frame.address),
                    symbol: frame.symbol.as_ref().map(|s| s.name.clone()),
                    module: frame.module.clone(),
                    file: frame.symbol.as_ref().and_then(|s| s.file.clone()),
                    line: frame.symbol.as_ref().and_then(|s| s.line),
                })
            })
            .collect();

        let mut args = HashMap::new();
        args.insert("frames".to_string(), JsonValue::Array(frames_json));
        args.insert(
            "frame_count".to_string(),
            serde_json::json!(frames.len()),
        );

        self.events.push(ChromeTraceEvent {
            name,
            cat: "callstack".to_string(),
            ph: "I".to_string(),
            ts: ts_us,
            s: "t".to_string(),
            pid: 1,
            tid: 1,
            args: Some(args),
        });
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.).
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let trace = ChromeTrace {
            trace_events: self.events.clone(),
            display_time_unit: "ms".to_string(),
        };
        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Get the number of events collected
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
