//! Sector classification for correlation limits.
//!
//! A configurable symbol → sector table plus groups of correlated sectors.
//! Unclassified symbols are exempt from sector caps.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Built-in classification used when the config provides none.
static DEFAULT_SECTORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("BTCUSDT", "core"),
        ("ETHUSDT", "core"),
        ("SOLUSDT", "layer1"),
        ("AVAXUSDT", "layer1"),
        ("ADAUSDT", "layer1"),
        ("DOTUSDT", "layer1"),
        ("NEARUSDT", "layer1"),
        ("ARBUSDT", "layer2"),
        ("OPUSDT", "layer2"),
        ("UNIUSDT", "defi"),
        ("AAVEUSDT", "defi"),
        ("LINKUSDT", "defi"),
        ("DOGEUSDT", "meme"),
        ("SHIBUSDT", "meme"),
        ("PEPEUSDT", "meme"),
    ])
});

/// Default correlated-sector groups: sectors that move together enough to
/// share a combined cap.
static DEFAULT_GROUPS: Lazy<Vec<Vec<&'static str>>> = Lazy::new(|| {
    vec![
        vec!["layer1", "layer2"],
        vec!["core", "defi"],
    ]
});

/// Sector classification table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorMap {
    /// symbol → sector.
    sectors: HashMap<String, String>,
    /// Groups of correlated sectors.
    groups: Vec<Vec<String>>,
}

impl SectorMap {
    pub fn new(sectors: HashMap<String, String>, groups: Vec<Vec<String>>) -> Self {
        Self { sectors, groups }
    }

    /// Sector of a symbol, if classified.
    pub fn sector_of(&self, symbol: &str) -> Option<&str> {
        self.sectors.get(symbol).map(String::as_str)
    }

    /// Sectors correlated with the given one (including itself), or just
    /// the sector when it belongs to no group.
    pub fn correlated_with<'a>(&'a self, sector: &'a str) -> Vec<&'a str> {
        for group in &self.groups {
            if group.iter().any(|s| s == sector) {
                return group.iter().map(String::as_str).collect();
            }
        }
        vec![sector]
    }
}

impl Default for SectorMap {
    fn default() -> Self {
        Self {
            sectors: DEFAULT_SECTORS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            groups: DEFAULT_GROUPS
                .iter()
                .map(|g| g.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }
}
