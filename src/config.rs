//! Typed configuration surface (§6).
//!
//! Each component takes an explicit config struct rather than a dynamic
//! options bag. All defaults match the documented values;
//! `EngineConfig::load_toml`/`save_toml` follow the usual TOML round-trip
//! convention for a typed config struct.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigResult, ConfigError};
use crate::gate::{EmissionGate, LzGate, MdlGate};

/// LZ-gate configuration: bounds the LRU candidate cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LzGateConfig {
    /// Maximum number of distinct candidate keys tracked by the LZ cache.
    pub cache_max: usize,
}

impl Default for LzGateConfig {
    fn default() -> Self {
        Self { cache_max: 1 << 16 }
    }
}

/// Whether the MDL gate's branching factor `Z` is read from observed child
/// degree or pinned to a fixed fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZMode {
    ChildDegree,
    Fixed,
}

/// MDL-gate configuration (§4.2.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdlGateConfig {
    /// Laplace smoothing constant.
    pub alpha: f64,
    /// EWMA step size.
    pub beta: f64,
    /// Surprise threshold, in standard deviations.
    pub c: f64,
    /// Entropy-test exponent.
    pub tau: f64,
    pub z_mode: ZMode,
    /// Fallback branching factor when `z_mode == Fixed`.
    pub z_fixed: u32,
    /// Hard cap on the MDL gate's edge-count table; beyond this,
    /// `MdlGate::capacity_status` reports `Exceeded` instead of growing
    /// further (§7).
    pub max_degree_table: usize,
}

impl Default for MdlGateConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            beta: 0.02,
            c: 0.7,
            tau: 0.8,
            z_mode: ZMode::ChildDegree,
            z_fixed: 4,
            max_degree_table: 1 << 20,
        }
    }
}

/// Tagged gate configuration, used to build a gate chain from config (§4 of
/// SPEC_FULL's supplemented features).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateConfig {
    Lz(LzGateConfig),
    Mdl(MdlGateConfig),
}

impl GateConfig {
    /// Construct the gate this config variant describes.
    pub fn build(&self) -> Box<dyn EmissionGate> {
        match self {
            GateConfig::Lz(cfg) => Box::new(LzGate::new(cfg)),
            GateConfig::Mdl(cfg) => Box::new(MdlGate::new(cfg.clone())),
        }
    }
}

/// Sequencer configuration: gate chain plus the key generator seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    pub gates: Vec<GateConfig>,
    pub key_generator_seed: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            gates: vec![GateConfig::Lz(LzGateConfig::default())],
            key_generator_seed: 0x811C_9DC5,
        }
    }
}

impl SequencerConfig {
    /// Build the ordered gate chain this config describes, ready to hand to
    /// `IntSequencer::new`. §6 describes `gates` as "an ordered list"; this
    /// is the from-config counterpart to constructing gates by hand.
    pub fn build_gate_chain(&self) -> Vec<Box<dyn EmissionGate>> {
        self.gates.iter().map(GateConfig::build).collect()
    }
}

/// Ingest configuration (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub log_progress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            log_progress: false,
        }
    }
}

/// Tokenizer node-potential weights (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub beta: f64,
    pub gamma: f64,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            beta: 0.15,
            gamma: 0.1,
        }
    }
}

/// Lattice configuration: cache sizing. `database_path` is reserved for the
/// optional snapshot file; an in-process Lattice with no path never touches
/// disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatticeConfig {
    pub database_path: Option<String>,
    pub cache_size: usize,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_size: 1000,
        }
    }
}

/// Top-level configuration bundle for the full pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub sequencer: SequencerConfig,
    pub ingest: IngestConfig,
    pub tokenizer: TokenizerConfig,
    pub lattice: LatticeConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load_toml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.ingest.batch_size, 1000);
        assert!((cfg.tokenizer.beta - 0.15).abs() < f64::EPSILON);
        assert!((cfg.tokenizer.gamma - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.sequencer.key_generator_seed, 0x811C_9DC5);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = EngineConfig::default();
        let toml_str = cfg.to_toml_string().unwrap();
        let loaded = EngineConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(loaded.ingest.batch_size, cfg.ingest.batch_size);
    }

    #[test]
    fn build_gate_chain_constructs_one_gate_per_config_entry() {
        let cfg = SequencerConfig {
            gates: vec![
                GateConfig::Lz(LzGateConfig::default()),
                GateConfig::Mdl(MdlGateConfig::default()),
            ],
            key_generator_seed: 1,
        };
        assert_eq!(cfg.build_gate_chain().len(), 2);
    }

    #[test]
    fn gate_config_round_trips_through_toml_tag() {
        let cfg = GateConfig::Mdl(MdlGateConfig::default());
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        assert!(toml_str.contains("kind = \"mdl\""));
        let loaded: GateConfig = toml::from_str(&toml_str).unwrap();
        matches!(loaded, GateConfig::Mdl(_));
    }

    #[test]
    fn file_round_trip() {
        let cfg = EngineConfig::default();
        let file = tempfile::NamedTempFile::new().unwrap();
        cfg.save_toml(file.path()).unwrap();
        let loaded = EngineConfig::load_toml(file.path()).unwrap();
        assert_eq!(loaded.lattice.cache_size, cfg.lattice.cache_size);
    }
}
