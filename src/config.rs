//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - sys2.toml (base configuration)
//! - sys2.local.toml (git-ignored local overrides)
//! - Environment variables (SYS2_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # sys2.toml
//! [hdc]
//! strategy = "dense"
//! geometry = 32768
//!
//! [proof]
//! timeout_ms = 5000
//! max_depth = 24
//! closed_world_assumption = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! SYS2_PROOF__MAX_DEPTH=32
//! SYS2_HDC__STRATEGY=sparse
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::hdc::{consts, Strategy};
use crate::parser::CommentPolicy;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hdc: HdcConfig,
    #[serde(default)]
    pub proof: ProofConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vector-layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdcConfig {
    /// Vector strategy (dense or sparse)
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Dense geometry in bits
    #[serde(default = "default_geometry")]
    pub geometry: usize,
}

/// Prover resource limits and semantics switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Per-call wall-clock budget in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum recursion depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum reasoning steps per call
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Depth cap for transitive/IS_A graph walks
    #[serde(default = "default_chain_depth")]
    pub max_chain_depth: usize,

    /// Negation-as-failure gate (default: open world)
    #[serde(default)]
    pub closed_world_assumption: bool,

    /// Enable the holographic vector fast path
    #[serde(default)]
    pub holographic_fast_path: bool,
}

/// Cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for the per-session derivation cache, in milliseconds
    #[serde(default = "default_derivation_ttl_ms")]
    pub derivation_ttl_ms: u64,
}

/// Parser behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Inline-comment policy for theory statements
    #[serde(default)]
    pub comment_policy: CommentPolicy,
}

/// Dimension-registry location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the registry TOML document. Missing file = degraded mode.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_strategy() -> Strategy {
    Strategy::Dense
}
fn default_geometry() -> usize {
    consts::GEOMETRY_DEFAULT
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_max_depth() -> usize {
    24
}
fn default_max_steps() -> u64 {
    50_000
}
fn default_chain_depth() -> usize {
    16
}
fn default_derivation_ttl_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for HdcConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            geometry: default_geometry(),
        }
    }
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_depth: default_max_depth(),
            max_steps: default_max_steps(),
            max_chain_depth: default_chain_depth(),
            closed_world_assumption: false,
            holographic_fast_path: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            derivation_ttl_ms: default_derivation_ttl_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. sys2.toml (base configuration)
    /// 2. sys2.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (SYS2_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("sys2.toml"))
            .merge(Toml::file("sys2.local.toml"))
            .merge(Env::prefixed("SYS2_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SYS2_").split("__"))
            .extract()
    }

    /// Configuration sized for tests: small geometry, tight limits.
    pub fn for_tests() -> Self {
        Self {
            hdc: HdcConfig {
                strategy: Strategy::Dense,
                geometry: consts::GEOMETRY_TEST,
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert_eq!(config.hdc.geometry, consts::GEOMETRY_DEFAULT);
        assert!(matches!(config.hdc.strategy, Strategy::Dense));
        assert!(!config.proof.closed_world_assumption);
        assert_eq!(config.proof.timeout_ms, 5_000);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).expect("serializes");
        assert!(text.contains("[hdc]"));
        assert!(text.contains("[proof]"));
        let back: Config = toml::from_str(&text).expect("deserializes");
        assert_eq!(back.proof.max_depth, config.proof.max_depth);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[proof]\nmax_depth = 8\n").expect("parses");
        assert_eq!(config.proof.max_depth, 8);
        assert_eq!(config.proof.timeout_ms, 5_000);
        assert_eq!(config.hdc.geometry, consts::GEOMETRY_DEFAULT);
    }
}
