//! Immutable view of the process environment and the validators that run
//! against it.
//!
//! The snapshot is taken once at startup. Nothing downstream reads
//! `std::env` directly, which keeps every step a function of its inputs.

use std::collections::BTreeMap;
use std::ffi::OsString;

use crate::{dlog_debug, Error, Result};

/// Logical variable name → value. Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment. Entries whose name or value
    /// is not valid UTF-8 are skipped.
    pub fn capture() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    pub fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_pairs(pairs.into_iter().filter_map(|(k, v)| {
            match (k.into_string(), v.into_string()) {
                (Ok(k), Ok(v)) => Some((k, v)),
                (Ok(k), Err(_)) => {
                    dlog_debug!("Skipping {}: value is not valid UTF-8", k);
                    None
                }
                (Err(k), _) => {
                    dlog_debug!("Skipping {:?}: name is not valid UTF-8", k);
                    None
                }
            }
        }))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name`, or `None` if unset or empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Value of `name`, falling back to `fallback`.
    pub fn resolve_with_fallback(&self, name: &str, fallback: &str) -> Option<&str> {
        self.get(name).or_else(|| self.get(fallback))
    }

    /// Boolean switch: `1`, `true`, `yes`, `on`.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false)
    }

    /// Fails if any name in the space-separated `names` is unset or empty.
    /// The error lists every missing name in order.
    pub fn require(&self, names: &str) -> Result<()> {
        let missing: Vec<String> = names
            .split_whitespace()
            .filter(|n| !self.is_set(n))
            .map(String::from)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::MissingRequiredVariable { names: missing })
    }

    /// Validates space-separated `name:fallback` pairs. A pair fails only if
    /// neither side is set. An entry without a colon is required as-is.
    pub fn require_with_fallback(&self, pairs: &str) -> Result<()> {
        for pair in pairs.split_whitespace() {
            match pair.split_once(':') {
                Some((name, fallback)) => {
                    if self.resolve_with_fallback(name, fallback).is_none() {
                        return Err(Error::MissingDefaultableVariable {
                            name: name.to_string(),
                            fallback: fallback.to_string(),
                        });
                    }
                }
                None => self.require(pair)?,
            }
        }
        Ok(())
    }

    /// Requires every name listed in the variable `list_var`. The list
    /// variable itself is optional.
    pub fn require_extra(&self, list_var: &str) -> Result<()> {
        match self.get(list_var) {
            Some(list) => self.require(list),
            None => Ok(()),
        }
    }

    /// Names listed in `list_var`, in order.
    pub fn list(&self, list_var: &str) -> Vec<&str> {
        self.get(list_var)
            .map(|l| l.split_whitespace().collect())
            .unwrap_or_default()
    }
}
