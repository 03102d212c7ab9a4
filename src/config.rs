use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{dlog_debug, Result};

pub const DEFAULT_TILLER_HOST: &str = "127.0.0.1:44134";
pub const DEFAULT_TILLER_STORAGE: &str = "secret";
pub const DEFAULT_CHART_ROOT: &str = "helm-chart";
const DEFAULT_TILLER_STARTUP_WAIT_SECS: u64 = 3;
const DEFAULT_POST_ROLLOUT_PAUSE_SECS: u64 = 5;

/// Tool-level settings read from an optional TOML file. Deployment inputs
/// come from the environment instead.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ToolConfig {
    pub kubectl: Option<String>,
    pub helm: Option<String>,
    pub tiller: Option<String>,
    pub tiller_host: Option<String>,
    pub tiller_storage: Option<String>,
    pub tiller_startup_wait_secs: Option<u64>,
    pub post_rollout_pause_secs: Option<u64>,
    pub rollout_timeout_secs: Option<u64>,
    pub helm_timeout_secs: Option<u64>,
    pub chart_root: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub certificate_authority: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl ToolConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("helm-deploy").join("config.toml"))
    }

    /// Load from `explicit`, else the default location. A missing file
    /// yields defaults; an explicit path that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            dlog_debug!("ToolConfig::load explicit path={}", path.display());
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                dlog_debug!("ToolConfig::load path={}", path.display());
                Self::load_from(&path)
            }
            _ => {
                dlog_debug!("Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        dlog_debug!("Config loaded: {:?}", config);
        Ok(config)
    }

    pub fn kubectl_bin(&self) -> &str {
        self.kubectl.as_deref().unwrap_or("kubectl")
    }

    pub fn helm_bin(&self) -> &str {
        self.helm.as_deref().unwrap_or("helm")
    }

    pub fn tiller_bin(&self) -> &str {
        self.tiller.as_deref().unwrap_or("tiller")
    }

    pub fn effective_tiller_host(&self) -> &str {
        self.tiller_host.as_deref().unwrap_or(DEFAULT_TILLER_HOST)
    }

    pub fn effective_tiller_storage(&self) -> &str {
        self.tiller_storage
            .as_deref()
            .unwrap_or(DEFAULT_TILLER_STORAGE)
    }

    pub fn effective_chart_root(&self) -> &str {
        self.chart_root.as_deref().unwrap_or(DEFAULT_CHART_ROOT)
    }

    pub fn tiller_startup_wait(&self) -> Duration {
        Duration::from_secs(
            self.tiller_startup_wait_secs
                .unwrap_or(DEFAULT_TILLER_STARTUP_WAIT_SECS),
        )
    }

    pub fn post_rollout_pause(&self) -> Duration {
        Duration::from_secs(
            self.post_rollout_pause_secs
                .unwrap_or(DEFAULT_POST_ROLLOUT_PAUSE_SECS),
        )
    }
}
