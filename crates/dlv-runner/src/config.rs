use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use dlv_storage::DEFAULT_LEAF_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub views: ViewsConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: String, // "sqlite" | "memory"
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewsConfig {
    pub design_name: String,
    #[serde(default = "default_leaf_size")]
    pub leaf_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsConfig {
    /// A run still pending this long after its start counts as timed out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_leaf_size() -> usize {
    DEFAULT_LEAF_SIZE
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Config {
    pub fn default_for_repo(design_name: &str) -> Self {
        Self {
            store: StoreConfig {
                backend: "sqlite".to_string(),
                path: ".dlv/dlv.db".to_string(),
            },
            views: ViewsConfig {
                design_name: design_name.to_string(),
                leaf_size: default_leaf_size(),
                workers: default_workers(),
            },
            events: EventsConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse dlv.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn backend(&self) -> Result<Backend> {
        match self.store.backend.as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => Err(anyhow!("unknown store backend: {other}")),
        }
    }

    /// Database file, tilde-expanded; relative paths hang off the repo root.
    pub fn store_path(&self, repo_root: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.store.path).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            repo_root.join(expanded)
        }
    }

    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.events.timeout_secs.min(u32::MAX as u64) as i64)
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".dlv").join("dlv.toml")
    }

    pub fn design_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".dlv").join("design.json")
    }
}
