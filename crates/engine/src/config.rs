#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const STORAGE_DIR_ENV: &str = "READPLAN_STORAGE_DIR";
pub const POINTER_MODE_ENV: &str = "READPLAN_POINTER_MODE";

const DEFAULT_DIR_NAME: &str = "readplan";

/// How completing a day moves the stored pointer of an ordinal plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerMode {
    /// Pointer is one past the longest run of completed days starting at day 1, in both
    /// directions (completion and retraction).
    #[default]
    ContiguousPrefix,
    /// Completion is tracked per day; only completing the day under the pointer moves it.
    Independent,
}

impl PointerMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "contiguous_prefix" | "prefix" => Some(Self::ContiguousPrefix),
            "independent" => Some(Self::Independent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pointer_mode: PointerMode,
    pub storage_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Defaults with `READPLAN_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parses a host-supplied JSON object; missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(POINTER_MODE_ENV)
            && !raw.trim().is_empty()
        {
            match PointerMode::parse(&raw) {
                Some(mode) => self.pointer_mode = mode,
                None => tracing::warn!(value = %raw, "ignoring unknown {POINTER_MODE_ENV}"),
            }
        }
        if let Some(dir) = env_dir(STORAGE_DIR_ENV) {
            self.storage_dir = Some(dir);
        }
        self
    }

    /// Explicit directory first, then `$XDG_STATE_HOME/readplan`,
    /// `$HOME/.local/state/readplan` and finally the temp dir.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage_dir {
            return dir.clone();
        }
        if let Some(state) = env_dir("XDG_STATE_HOME") {
            return state.join(DEFAULT_DIR_NAME);
        }
        if let Some(home) = env_dir("HOME") {
            return home.join(".local/state").join(DEFAULT_DIR_NAME);
        }
        std::env::temp_dir().join(DEFAULT_DIR_NAME)
    }
}

fn env_dir(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
