use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::markers::DEFAULT_MARKER_LIMIT;

/// Timing of the task harness around the arbiter.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Dispatch period of the tick task (~60 Hz).
    pub tick_ms: u64,
    /// Reactive task sleep when no percept is ready.
    pub reactive_idle_ms: u64,
    /// Deliberative task sleep when the escalation queue is empty.
    pub deliberative_idle_ms: u64,
    /// Reactive cycles slower than this are flagged, not aborted.
    pub reactive_budget_ms: u64,
    /// Delay before the first stimulus poll.
    pub stimulus_warmup_ms: u64,
    pub stimulus_interval_ms: u64,
    pub marker_limit: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            reactive_idle_ms: 5,
            deliberative_idle_ms: 50,
            reactive_budget_ms: 100,
            stimulus_warmup_ms: 5_000,
            stimulus_interval_ms: 10_000,
            marker_limit: DEFAULT_MARKER_LIMIT,
        }
    }
}

impl ArbiterConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn reactive_idle(&self) -> Duration {
        Duration::from_millis(self.reactive_idle_ms)
    }

    pub fn deliberative_idle(&self) -> Duration {
        Duration::from_millis(self.deliberative_idle_ms)
    }

    pub fn reactive_budget(&self) -> Duration {
        Duration::from_millis(self.reactive_budget_ms)
    }

    pub fn stimulus_warmup(&self) -> Duration {
        Duration::from_millis(self.stimulus_warmup_ms)
    }

    pub fn stimulus_interval(&self) -> Duration {
        Duration::from_millis(self.stimulus_interval_ms.max(1))
    }
}

/// llama-server style completion backend used for deliberation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliberationConfig {
    /// Base URL; `/completion` is appended.
    pub server_url: String,
    pub n_predict: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            n_predict: 512,
            temperature: 0.4,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// TCP address of the body's newline-delimited JSON link.
    pub body_addr: String,
    pub arbiter: ArbiterConfig,
    pub deliberation: DeliberationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            body_addr: "127.0.0.1:5555".to_string(),
            arbiter: ArbiterConfig::default(),
            deliberation: DeliberationConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Loads `relative_path` if it can be found, otherwise defaults; then applies env overrides.
    pub fn load(relative_path: &str) -> anyhow::Result<Self> {
        let mut cfg = match ConfigLoader::resolve_path(relative_path) {
            Some(path) => ConfigLoader::parse_from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// `ARBITER_*` overrides. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("ARBITER_BODY_ADDR") {
            self.body_addr = addr;
        }
        if let Some(url) = get("ARBITER_SOUL_URL") {
            self.deliberation.server_url = url;
        }
        if let Some(v) = get("ARBITER_TICK_MS") {
            self.arbiter.tick_ms = v
                .trim()
                .parse()
                .with_context(|| format!("invalid ARBITER_TICK_MS={v:?}"))?;
        }
        if let Some(v) = get("ARBITER_REACTIVE_BUDGET_MS") {
            self.arbiter.reactive_budget_ms = v
                .trim()
                .parse()
                .with_context(|| format!("invalid ARBITER_REACTIVE_BUDGET_MS={v:?}"))?;
        }
        Ok(())
    }
}

/// Config file lookup.
///
/// Search order:
/// 1) `ARBITER_CONFIG_DIR/<relative_path>`
/// 2) `./<relative_path>`
/// 3) `<repo_root>/config/<relative_path>`
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn parse_from_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse_from_str(&text)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse_from_str<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
        toml::from_str(text).context("Failed to parse TOML")
    }

    pub fn resolve_path(relative_path: &str) -> Option<PathBuf> {
        let rel = Path::new(relative_path);

        if let Some(root) = env::var_os("ARBITER_CONFIG_DIR") {
            let candidate = PathBuf::from(root).join(rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if let Ok(cwd) = env::current_dir() {
            let candidate = cwd.join(rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // This crate lives at <repo_root>/crates/arbiter-core.
        let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .ancestors()
            .nth(2)?
            .join("config")
            .join(rel);
        candidate.is_file().then_some(candidate)
    }
}
