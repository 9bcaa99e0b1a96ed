//! # stackreel viewer
//!
//! Replays a recorded event log and prints every callstack with whatever
//! symbol detail the platform debug-help library can recover. On Windows
//! the frames resolve to `symbol`, `file:line` and module path; elsewhere
//! the log still replays with module attribution only (useful for a quick
//! look at a log copied off the target machine).
//!
//! ```bash
//! # Replay the default log next to the current directory
//! stackreel
//!
//! # Replay a specific log and keep a timeline for Perfetto
//! stackreel run1.bin --export run1.json
//! ```

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use stackreel::analysis::HotspotStats;
use stackreel::cli::Args;
use stackreel::export::ChromeTraceExporter;
use stackreel::playback::{Player, SymbolSource};

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    #[cfg(windows)]
    let source = stackreel::playback::DbgHelpSource::new()
        .context("failed to initialize the dbghelp session")?;

    #[cfg(not(windows))]
    let source = {
        log::warn!("dbghelp is unavailable on this host; frames will not be symbolicated");
        stackreel::playback::NullSymbolSource
    };

    run(&args, source)
}

fn run<S: SymbolSource>(args: &Args, source: S) -> Result<()> {
    let mut player = Player::new(source);
    let mut exporter = args.export.as_ref().map(|_| ChromeTraceExporter::new());
    let mut hotspots = args.hotspots.then(HotspotStats::new);

    let mut printed = 0u64;
    let stats = player
        .replay_file(&args.log, |timestamp, frames| {
            if let Some(exporter) = exporter.as_mut() {
                exporter.add_callstack(timestamp, frames);
            }
            if let Some(hotspots) = hotspots.as_mut() {
                hotspots.record_callstack(frames);
            }
            if args.limit == 0 || printed < args.limit {
                println!("callstack @ {timestamp} ({} frames)", frames.len());
                for (index, frame) in frames.iter().enumerate() {
                    println!("  {}", frame.format(index));
                }
                println!();
            }
            printed += 1;
        })
        .with_context(|| format!("replay of {} failed", args.log.display()))?;

    println!("{stats}");
    if printed > args.limit && args.limit != 0 {
        println!("({} callstacks not shown)", printed - args.limit);
    }

    if let Some(hotspots) = &hotspots {
        println!("\ncapture sites ({} callstacks):", hotspots.total());
        for site in hotspots.to_sites().iter().take(10) {
            let mut line = format!("  {:>5.1}%  {:>6}  {}", site.percentage, site.count, site.name);
            if let (Some(file), Some(number)) = (&site.file, site.line) {
                line.push_str(&format!("  ({file}:{number})"));
            }
            println!("{line}");
        }
        if hotspots.empty_stacks() > 0 {
            println!("  ({} empty callstacks not attributed)", hotspots.empty_stacks());
        }
    }

    if let (Some(exporter), Some(path)) = (exporter, args.export.as_ref()) {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        exporter.export(BufWriter::new(file))?;
        info!("wrote {} trace events to {}", exporter.event_count(), path.display());
        println!("exported {}", path.display());
    }

    Ok(())
}
