//! Project-specific chart overrides.
//!
//! `PROJECT_SPECIFIC_DEPLOY_ARGS` lists environment variables to forward to
//! the chart. `APP__TIMEOUT=30` becomes `--set app.timeout=30`.

use std::sync::LazyLock;

use regex::Regex;

use crate::env::EnvSnapshot;
use crate::{Error, Result};

pub const DEPLOY_ARGS_VAR: &str = "PROJECT_SPECIFIC_DEPLOY_ARGS";

/// One `--set key=value` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFlag {
    pub key: String,
    pub value: String,
    pub secret: bool,
}

impl SetFlag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: false,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            secret: true,
            ..Self::new(key, value)
        }
    }

    pub fn assignment(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

static VAR_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// `APP__HTTP__PORT` → `app.http.port`.
pub fn chart_key(var_name: &str) -> String {
    var_name.replace("__", ".").to_lowercase()
}

/// Every allowlisted name must be a variable name and be set.
pub fn validate(env: &EnvSnapshot) -> Result<()> {
    if let Some(bad) = env
        .list(DEPLOY_ARGS_VAR)
        .into_iter()
        .find(|n| !VAR_NAME_RE.is_match(n))
    {
        return Err(Error::Validation(format!(
            "{} contains an invalid variable name: {:?}",
            DEPLOY_ARGS_VAR, bad
        )));
    }
    env.require_extra(DEPLOY_ARGS_VAR)
}

/// Overrides in allowlist order. Call `validate` first; unset names are skipped.
pub fn build(env: &EnvSnapshot) -> Vec<SetFlag> {
    env.list(DEPLOY_ARGS_VAR)
        .into_iter()
        .filter_map(|name| env.get(name).map(|value| SetFlag::new(chart_key(name), value)))
        .collect()
}
