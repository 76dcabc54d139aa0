use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Error, Result};

/// What the ingest pipeline does when a secret pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretPolicy {
    /// Replace matched regions with a fixed placeholder
    Redact,
    /// Refuse the write with SensitiveContent
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub candidate_pool_max: usize,
    pub scored_max: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_pool_max: 2000,
            scored_max: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    pub enabled: bool,
    pub handoffs_per_run_daily: usize,
    pub handoffs_per_run_weekly: usize,
    /// Items per checkpoint batch inside a job
    pub batch_size: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handoffs_per_run_daily: 100,
            handoffs_per_run_weekly: 700,
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    pub write_s: u64,
    pub acb_fast_s: u64,
    pub acb_retrieval_s: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            write_s: 30,
            acb_fast_s: 5,
            acb_retrieval_s: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    #[serde(default = "default_excerpt_bytes_max")]
    pub tool_result_excerpt_bytes_max: usize,
    #[serde(default = "default_secret_policy")]
    pub secret_policy: SecretPolicy,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
}

fn default_max_tokens() -> u32 {
    65000
}

fn default_excerpt_bytes_max() -> usize {
    64 * 1024
}

fn default_secret_policy() -> SecretPolicy {
    SecretPolicy::Redact
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            tool_result_excerpt_bytes_max: default_excerpt_bytes_max(),
            secret_policy: default_secret_policy(),
            retrieval: RetrievalConfig::default(),
            consolidation: ConsolidationConfig::default(),
            deadlines: DeadlineConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Invalid(format!("cannot read config {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Invalid(format!("bad config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Invalid(format!("cannot create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Invalid(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Invalid(format!("cannot write config: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.scored_max > self.retrieval.candidate_pool_max {
            return Err(Error::Invalid(
                "retrieval.scored_max cannot exceed retrieval.candidate_pool_max".to_string(),
            ));
        }
        if self.consolidation.batch_size == 0 {
            return Err(Error::Invalid(
                "consolidation.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
