//! Recording-time module address map.
//!
//! Maps the half-open address ranges modules occupied *in the recorded
//! process* to their metadata. Ranges never overlap: inserting a module
//! whose range intersects existing entries evicts them first, which is how
//! a duplicated `add_module` (the enumeration/subscription race) or a
//! reused base address resolves to the newest module.

use std::collections::BTreeMap;

use stackreel_common::WidePath;

use crate::domain::ModuleRange;

/// One replayed module: where it lived during recording, and where the
/// symbol library re-loaded it for this session (`None` when the symbol
/// load failed; frames in the range then degrade to raw addresses).
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub path: WidePath,
    pub range: ModuleRange,
    pub relocated_base: Option<u64>,
}

/// Ordered map from recording-time base address to module entry, with a
/// point-query by contained address.
#[derive(Debug, Default)]
pub struct ModuleMap {
    by_base: BTreeMap<u64, ModuleEntry>,
}

impl ModuleMap {
    pub fn new() -> Self {
        ModuleMap::default()
    }

    pub fn len(&self) -> usize {
        self.by_base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }

    /// Insert an entry, evicting every entry whose range overlaps it.
    pub fn insert(&mut self, entry: ModuleEntry) {
        let evicted: Vec<u64> = self
            .by_base
            .range(..entry.range.end())
            .rev()
            .take_while(|(_, existing)| existing.range.overlaps(entry.range))
            .map(|(&base, _)| base)
            .collect();
        for base in evicted {
            self.by_base.remove(&base);
        }
        self.by_base.insert(entry.range.base, entry);
    }

    /// Remove the lowest-based entry recorded under `path`, if any. A miss
    /// is not an error: unload notifications can name modules whose load
    /// predates the log.
    pub fn remove_by_path(&mut self, path: &WidePath) -> Option<ModuleEntry> {
        let base = self
            .by_base
            .iter()
            .find(|(_, entry)| entry.path == *path)
            .map(|(&base, _)| base)?;
        self.by_base.remove(&base)
    }

    /// The unique entry whose recording-time range contains `addr`.
    pub fn lookup(&self, addr: u64) -> Option<&ModuleEntry> {
        self.by_base
            .range(..=addr)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.range.contains(addr))
    }
}
