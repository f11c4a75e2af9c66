//! `load_config` module: Loads a static YAML config and applies environment overrides.
//!
//! This module is the only place where untrusted YAML is parsed and mapped to typed
//! structs for the CLI.
//!
//! # Responsibilities
//! - Parse the YAML file into [`CliConfig`] (source, store and pipeline sections)
//! - Apply `MAX_CONCURRENCY` / `ROOT_LIMIT` environment overrides to the pipeline section
//! - Surface every failure as an `anyhow::Error` with the offending path or variable
//!
//! Accepted schema:
//!
//! ```yaml
//! source:
//!   type: hacker_news
//!   list: top
//! store:
//!   type: json_dir
//!   path: ./data
//! pipeline:
//!   concurrency: 5
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tree_ingest_core::config::PipelineConfig;

use crate::hacker_news::StoryList;

pub const ENV_MAX_CONCURRENCY: &str = "MAX_CONCURRENCY";
pub const ENV_ROOT_LIMIT: &str = "ROOT_LIMIT";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub source: SourceSection,
    pub store: StoreSection,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Where items come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSection {
    HackerNews(HackerNewsSection),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HackerNewsSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub list: StoryList,
}

/// Where records go.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreSection {
    JsonDir(JsonDirSection),
    /// Throwaway in-process store, nothing survives the run.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonDirSection {
    pub path: PathBuf,
    /// Subdirectory for this run's records; defaults to the story list name.
    #[serde(default)]
    pub collection: Option<String>,
}

impl CliConfig {
    /// Directory the JSON store should open, if the store is directory-backed.
    pub fn collection_dir(&self) -> Option<PathBuf> {
        let StoreSection::JsonDir(dir) = &self.store else {
            return None;
        };
        let SourceSection::HackerNews(hn) = &self.source;
        let collection = dir
            .collection
            .clone()
            .unwrap_or_else(|| hn.list.as_str().to_string());
        Some(dir.path.join(collection))
    }

    pub fn trace_loaded(&self) {
        match &self.source {
            SourceSection::HackerNews(hn) => info!(
                source = "hacker_news",
                list = hn.list.as_str(),
                base_url = hn.base_url.as_deref().unwrap_or("default"),
                "Loaded source section"
            ),
        }
        match self.collection_dir() {
            Some(dir) => info!(store = "json_dir", path = %dir.display(), "Loaded store section"),
            None => info!(store = "memory", "Loaded store section"),
        }
        self.pipeline.trace_loaded();
    }
}

/// Loads a static YAML config file and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    apply_env_overrides(&mut config.pipeline)?;
    config.pipeline.validate()?;

    Ok(config)
}

fn apply_env_overrides(pipeline: &mut PipelineConfig) -> Result<()> {
    if let Some(concurrency) = env_usize(ENV_MAX_CONCURRENCY)? {
        info!(concurrency, "Concurrency overridden from environment");
        pipeline.concurrency = concurrency;
    }
    if let Some(limit) = env_usize(ENV_ROOT_LIMIT)? {
        info!(root_limit = limit, "Root limit overridden from environment");
        pipeline.root_limit = limit;
    }
    Ok(())
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .with_context(|| format!("{name} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(None),
    }
}
