//! Capture-site aggregation over a replayed stream.
//!
//! Capture is explicit, so the innermost frame of every callstack is the
//! place the host decided was worth recording. Aggregating those frames
//! answers "where did the captures come from, and how often" without
//! re-reading the log.
//!
//! Feed [`HotspotStats::record_callstack`] from the replay callback, then
//! [`to_sites`](HotspotStats::to_sites) for a ranked list.

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use crate::playback::ResolvedFrame;

/// One ranked capture site.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSite {
    /// Resolved symbol name, or the formatted raw address when the frame
    /// never resolved.
    pub name: String,

    /// Number of callstacks that started here.
    pub count: u64,

    /// Share of all aggregated callstacks (0.0 - 100.0).
    pub percentage: f64,

    /// Module the site resolved into, when known.
    pub module: Option<String>,

    /// Source location, when line information was available.
    pub file: Option<String>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct SiteStats {
    count: u64,
    module: Option<String>,
    file: Option<String>,
    line: Option<u32>,
}

/// Streaming aggregator of capture sites.
#[derive(Debug, Default)]
pub struct HotspotStats {
    sites: HashMap<String, SiteStats>,
    total: u64,
    empty_stacks: u64,
}

impl HotspotStats {
    pub fn new() -> Self {
        HotspotStats::default()
    }

    /// Record one replayed callstack. Empty stacks are counted separately;
    /// they carry no site to attribute.
    pub fn record_callstack(&mut self, frames: &[ResolvedFrame]) {
        let Some(innermost) = frames.first() else {
            self.empty_stacks += 1;
            return;
        };
        self.total += 1;

        let name = match &innermost.symbol {
            Some(symbol) => symbol.name.clone(),
            None => format!("0x{:016x}", innermost.address),
        };
        let stats = self.sites.entry(name).or_default();
        stats.count += 1;
        // Location metadata comes from the first occurrence; later stacks
        // from the same site cannot disagree within one replay.
        if stats.module.is_none() {
            stats.module = innermost.module.clone();
        }
        if stats.file.is_none() {
            if let Some(symbol) = &innermost.symbol {
                stats.file = symbol.file.clone();
                stats.line = symbol.line;
            }
        }
    }

    /// Callstacks aggregated so far, not counting empty ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Empty callstacks seen so far.
    pub fn empty_stacks(&self) -> u64 {
        self.empty_stacks
    }

    /// Ranked capture sites, most frequent first.
    pub fn to_sites(&self) -> Vec<CaptureSite> {
        let mut sites: Vec<CaptureSite> = self
            .sites
            .iter()
            .map(|(name, stats)| {
                let percentage = if self.total > 0 {
                    (stats.count as f64 / self.total as f64) * 100.0
                } else {
                    0.0
                };
                CaptureSite {
                    name: name.clone(),
                    count: stats.count,
                    percentage,
                    module: stats.module.clone(),
                    file: stats.file.clone(),
                    line: stats.line,
                }
            })
            .collect();

        sites.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::SymbolInfo;

    fn frame(addr: u64, symbol: Option<(&str, &str, u32)>) -> ResolvedFrame {
        ResolvedFrame {
            address: addr,
            module: symbol.map(|_| "app.exe".to_string()),
            symbol: symbol.map(|(name, file, line)| SymbolInfo {
                name: name.to_string(),
                file: Some(file.to_string()),
                line: Some(line),
            }),
        }
    }

    #[test]
    fn aggregates_by_innermost_symbol() {
        let mut stats = HotspotStats::new();
        stats.record_callstack(&[frame(0x10, Some(("alpha", "a.rs", 1))), frame(0x99, None)]);
        stats.record_callstack(&[frame(0x14, Some(("alpha", "a.rs", 1)))]);
        stats.record_callstack(&[frame(0x20, Some(("beta", "b.rs", 2)))]);

        let sites = stats.to_sites();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name, "alpha");
        assert_eq!(sites[0].count, 2);
        assert!((sites[0].percentage - 66.666).abs() < 0.01);
        assert_eq!(sites[1].name, "beta");
        assert_eq!(sites[1].count, 1);
    }

    #[test]
    fn unresolved_sites_rank_by_address() {
        let mut stats = HotspotStats::new();
        stats.record_callstack(&[frame(0xdead, None)]);
        stats.record_callstack(&[frame(0xdead, None)]);

        let sites = stats.to_sites();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "0x000000000000dead");
        assert_eq!(sites[0].count, 2);
        assert!(sites[0].file.is_none());
    }

    #[test]
    fn empty_stacks_are_counted_but_not_ranked() {
        let mut stats = HotspotStats::new();
        stats.record_callstack(&[]);
        stats.record_callstack(&[frame(0x1, Some(("only", "o.rs", 9)))]);

        assert_eq!(stats.empty_stacks(), 1);
        assert_eq!(stats.total(), 1);
        let sites = stats.to_sites();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].percentage, 100.0);
    }

    #[test]
    fn source_location_comes_from_first_occurrence() {
        let mut stats = HotspotStats::new();
        stats.record_callstack(&[frame(0x10, Some(("alpha", "a.rs", 1)))]);
        stats.record_callstack(&[frame(0x10, Some(("alpha", "a.rs", 1)))]);

        let sites = stats.to_sites();
        assert_eq!(sites[0].file.as_deref(), Some("a.rs"));
        assert_eq!(sites[0].line, Some(1));
        assert_eq!(sites[0].module.as_deref(), Some("app.exe"));
    }
}
