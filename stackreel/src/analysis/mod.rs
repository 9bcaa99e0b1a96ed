//! Post-replay aggregation.

pub mod hotspots;

pub use hotspots::{CaptureSite, HotspotStats};
