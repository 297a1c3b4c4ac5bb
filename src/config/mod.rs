//! Configuration loading and management.
//!
//! YAML config with two top-level blocks: `lxu_strategy` picks the eviction
//! strategy and its tuning knobs, `id_transformer` picks the single-shard
//! layout and optionally wraps it under `type: thread` for a sharded
//! composite.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::TransformerError;
use crate::strategy::MixedLfuLruStrategy;
use crate::variant::{IdTransformerVariant, Underlying};

pub const CONFIG_PATH: &str = "cfg/transformer.cfg.yaml";
pub const CONFIG_PATH_LOCAL: &str = "cfg/transformer.cfg.local.yaml";

fn default_min_used_freq_power() -> u16 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LxuStrategyConfig {
    MixedLruLfu {
        #[serde(default = "default_min_used_freq_power")]
        min_used_freq_power: u16,
    },
}

impl LxuStrategyConfig {
    pub fn build(&self) -> MixedLfuLruStrategy {
        match self {
            LxuStrategyConfig::MixedLruLfu { min_used_freq_power } => {
                MixedLfuLruStrategy::new(*min_used_freq_power)
            }
        }
    }
}

/// `id_transformer.type`: `"naive"` and `"cacheline"` are leaf layouts;
/// `"thread"` wraps one of the two leaves with a shard count.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdTransformerConfig {
    Naive,
    Cacheline,
    Thread {
        underlying: Box<IdTransformerConfig>,
        num_threads: u32,
    },
}

impl IdTransformerConfig {
    /// Resolves to a concrete `(layout, shard count)` pair, rejecting
    /// nested `thread` wrappers (a thread pool of thread pools is not a
    /// layout this crate's variant set models).
    fn resolve(&self) -> Result<(Underlying, usize), TransformerError> {
        match self {
            IdTransformerConfig::Naive => Ok((Underlying::Naive, 1)),
            IdTransformerConfig::Cacheline => Ok((Underlying::Cacheline, 1)),
            IdTransformerConfig::Thread { underlying, num_threads } => {
                if *num_threads == 0 {
                    return Err(TransformerError::ConfigInvalid(
                        "id_transformer.thread.num_threads must be greater than zero".to_string(),
                    ));
                }
                match underlying.as_ref() {
                    IdTransformerConfig::Naive => Ok((Underlying::Naive, *num_threads as usize)),
                    IdTransformerConfig::Cacheline => Ok((Underlying::Cacheline, *num_threads as usize)),
                    IdTransformerConfig::Thread { .. } => Err(TransformerError::ConfigInvalid(
                        "id_transformer.thread.underlying cannot itself be \"thread\"".to_string(),
                    )),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub lxu_strategy: LxuStrategyConfig,
    pub id_transformer: IdTransformerConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config yaml file {path:?}"))?;
        let cfg: Config =
            serde_yaml::from_str(&data).with_context(|| format!("unmarshal yaml from {path:?}"))?;
        Ok(cfg)
    }

    pub fn strategy(&self) -> MixedLfuLruStrategy {
        self.lxu_strategy.build()
    }

    pub fn build_transformer(&self, num_embeddings: u32) -> Result<IdTransformerVariant, TransformerError> {
        let (underlying, num_threads) = self.id_transformer.resolve()?;
        Ok(IdTransformerVariant::new(underlying, num_embeddings, num_threads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_naive_with_default_min_freq_power() {
        let yaml = "lxu_strategy:\n  type: mixed_lru_lfu\nid_transformer:\n  type: naive\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let (underlying, num_threads) = cfg.id_transformer.resolve().unwrap();
        assert_eq!(underlying, Underlying::Naive);
        assert_eq!(num_threads, 1);
        match &cfg.lxu_strategy {
            LxuStrategyConfig::MixedLruLfu { min_used_freq_power } => assert_eq!(*min_used_freq_power, 5),
        }
    }

    #[test]
    fn parses_threaded_cacheline() {
        let yaml = "lxu_strategy:\n  type: mixed_lru_lfu\n  min_used_freq_power: 3\nid_transformer:\n  type: thread\n  num_threads: 8\n  underlying:\n    type: cacheline\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let (underlying, num_threads) = cfg.id_transformer.resolve().unwrap();
        assert_eq!(underlying, Underlying::Cacheline);
        assert_eq!(num_threads, 8);
    }

    #[test]
    fn rejects_nested_thread_underlying() {
        let yaml = "lxu_strategy:\n  type: mixed_lru_lfu\nid_transformer:\n  type: thread\n  num_threads: 4\n  underlying:\n    type: thread\n    num_threads: 2\n    underlying:\n      type: naive\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.id_transformer.resolve().is_err());
    }

    #[test]
    fn rejects_zero_num_threads() {
        let yaml = "lxu_strategy:\n  type: mixed_lru_lfu\nid_transformer:\n  type: thread\n  num_threads: 0\n  underlying:\n    type: naive\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let err = cfg.id_transformer.resolve().unwrap_err();
        assert!(matches!(err, TransformerError::ConfigInvalid(_)));
        assert!(cfg.build_transformer(16).is_err());
    }

    #[test]
    fn rejects_unknown_id_transformer_type() {
        let yaml = "lxu_strategy:\n  type: mixed_lru_lfu\nid_transformer:\n  type: quadratic\n";
        let result: Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }
}
