//! Record this process, then immediately replay the dump.
//!
//! Captures a handful of stacks from nested calls, dumps the event log to a
//! temp file, and replays it through the platform symbol source. On Windows
//! with PDBs next to the binary the frames come back with symbol names and
//! lines; elsewhere this still demonstrates the record/dump/replay cycle.
//!
//! Run with: cargo run --example record-replay

use anyhow::Result;

use stackreel::playback::Player;
use stackreel::recording;

#[inline(never)]
fn leaf(n: u32) {
    // Capture from the deepest point so the whole chain is on the stack.
    recording::capture();
    std::hint::black_box(n);
}

#[inline(never)]
fn middle(n: u32) {
    leaf(n * 2);
}

#[inline(never)]
fn outer(n: u32) {
    middle(n + 1);
}

fn main() -> Result<()> {
    env_logger::init();

    println!("capturing 5 stacks...");
    for i in 0..5 {
        outer(i);
    }

    let log_path = std::env::temp_dir().join("stackreel-demo.bin");
    let bytes = recording::dump(&log_path)?;
    recording::shutdown();
    println!("dumped {bytes} bytes to {}\n", log_path.display());

    #[cfg(windows)]
    let source = stackreel::playback::DbgHelpSource::new()?;
    #[cfg(not(windows))]
    let source = stackreel::playback::NullSymbolSource;

    let mut player = Player::new(source);
    let stats = player.replay_file(&log_path, |timestamp, frames| {
        println!("callstack @ {timestamp} ({} frames)", frames.len());
        for (index, frame) in frames.iter().take(8).enumerate() {
            println!("  {}", frame.format(index));
        }
        if frames.len() > 8 {
            println!("  ... {} more", frames.len() - 8);
        }
        println!();
    })?;

    println!("{stats}");
    Ok(())
}
