use anyhow::{Context, Result};
use facetally_core::Tuning;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk configuration file.
///
/// ```toml
/// [tuning]
/// match_threshold = 0.55
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub tuning: Tuning,
}

impl Config {
    /// Defaults, overlaid by the optional TOML file, overlaid by
    /// `FACETALLY_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.tuning.validate().context("invalid tuning")?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override tuning from environment variables. Unparseable values are
    /// ignored, like missing ones.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let t = &mut self.tuning;
        t.match_threshold = env_f64(&lookup, "FACETALLY_MATCH_THRESHOLD", t.match_threshold);
        t.outlier_distance = env_f64(&lookup, "FACETALLY_OUTLIER_DISTANCE", t.outlier_distance);
        t.duplicate_distance =
            env_f64(&lookup, "FACETALLY_DUPLICATE_DISTANCE", t.duplicate_distance);
        t.consistency_scale =
            env_f64(&lookup, "FACETALLY_CONSISTENCY_SCALE", t.consistency_scale);
        t.max_captures = env_usize(&lookup, "FACETALLY_MAX_CAPTURES", t.max_captures);
    }
}

fn env_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
