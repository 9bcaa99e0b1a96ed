//! Replay-to-export pipeline test: a log goes in, a valid Chrome trace
//! document comes out.

use std::io::Cursor;

use stackreel::export::ChromeTraceExporter;
use stackreel::playback::{NullSymbolSource, Player};
use stackreel::{Event, Record, WidePath};

fn log_of(records: &[Record]) -> Vec<u8> {
    let mut log = Vec::new();
    for record in records {
        log.extend_from_slice(&record.to_bytes().unwrap());
    }
    log
}

#[test]
fn replayed_log_exports_as_valid_chrome_trace() {
    let log = log_of(&[
        Record {
            timestamp_ns: 1_000,
            event: Event::AddModule {
                path: WidePath::from("app.exe"),
                base: 0x40_0000,
                size: 0x1_0000,
            },
        },
        Record {
            timestamp_ns: 2_000,
            event: Event::Callstack {
                frames: vec![0x40_1000, 0x40_2000],
            },
        },
        Record {
            timestamp_ns: 9_000,
            event: Event::Callstack {
                frames: vec![0x40_3000],
            },
        },
    ]);

    let mut player = Player::new(NullSymbolSource);
    let mut exporter = ChromeTraceExporter::new();
    let stats = player
        .replay(Cursor::new(log), |ts, frames| {
            exporter.add_callstack(ts, frames);
        })
        .unwrap();

    assert_eq!(stats.callstacks, 2);
    assert_eq!(exporter.event_count(), 2);

    let mut buffer = Vec::new();
    exporter.export(&mut buffer).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

    let events = parsed["traceEvents"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(parsed["displayTimeUnit"], "ms");

    // NullSymbolSource resolves no symbols, but module attribution and the
    // raw addresses survive into the export.
    let first = &events[0];
    assert_eq!(first["ph"], "I");
    assert_eq!(first["args"]["frame_count"], 2);
    assert_eq!(
        first["args"]["frames"][0]["module"],
        serde_json::json!("app.exe")
    );
    // Second event is 7µs after the first.
    assert_eq!(events[1]["ts"], 7.0);
}
