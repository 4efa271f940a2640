//! Symbol registry
//!
//! Maps ledger symbols to provider-specific ids, loaded once from two JSON
//! config files of the shape:
//!
//! ```json
//! {
//!     "DAI": { "id": "dai", "symbol": "dai", "name": "Dai" },
//!     "MINE": { "id": "terra178jy...", "symbol": "mine", "name": "Pylon Protocol" }
//! }
//! ```
//!
//! A symbol absent from a mapping is a normal lookup miss, not an error.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// One curated symbol entry from a config file
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    /// Provider id: CoinGecko coin id or Coinhall pair-contract address
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default)]
pub struct SymbolRegistry {
    primary: HashMap<String, SymbolConfig>,
    secondary: HashMap<String, SymbolConfig>,
}

impl SymbolRegistry {
    pub fn new(
        primary: HashMap<String, SymbolConfig>,
        secondary: HashMap<String, SymbolConfig>,
    ) -> Self {
        Self { primary, secondary }
    }

    /// Load both mappings; a single missing/unreadable file degrades to an
    /// empty mapping, both failing is fatal.
    pub fn load(primary_path: &Path, secondary_path: &Path) -> Result<Self> {
        let primary = load_mapping(primary_path);
        let secondary = load_mapping(secondary_path);

        if let (Err(p), Err(s)) = (&primary, &secondary) {
            bail!("no symbol configuration could be loaded: {}; {}", p, s);
        }

        Ok(Self {
            primary: primary.unwrap_or_else(|e| {
                log::warn!("Primary symbol config unavailable: {}", e);
                HashMap::new()
            }),
            secondary: secondary.unwrap_or_else(|e| {
                log::warn!("Secondary symbol config unavailable: {}", e);
                HashMap::new()
            }),
        })
    }

    pub fn lookup_primary(&self, symbol: &str) -> Option<&str> {
        self.primary.get(symbol).map(|cfg| cfg.id.as_str())
    }

    pub fn lookup_secondary(&self, symbol: &str) -> Option<&str> {
        self.secondary.get(symbol).map(|cfg| cfg.id.as_str())
    }
}

fn load_mapping(path: &Path) -> Result<HashMap<String, SymbolConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read symbol config {}", path.display()))?;
    parse_mapping(&raw).with_context(|| format!("cannot parse symbol config {}", path.display()))
}

/// Parse a symbol config document, skipping malformed entries.
fn parse_mapping(raw: &str) -> Result<HashMap<String, SymbolConfig>> {
    let entries: HashMap<String, serde_json::Value> =
        serde_json::from_str(raw).context("config is not a JSON object")?;

    let mut mapping = HashMap::new();
    for (symbol, value) in entries {
        match serde_json::from_value::<SymbolConfig>(value) {
            Ok(cfg) => {
                mapping.insert(symbol, cfg);
            }
            Err(e) => log::warn!("Skipping malformed config entry for {}: {}", symbol, e),
        }
    }
    Ok(mapping)
}
