//! Registry credentials for pulling images of non-public projects.

use crate::deploy_args::SetFlag;
use crate::env::EnvSnapshot;
use crate::Result;

pub const REGISTRY_VARS: &str = "CI_REGISTRY CI_DEPLOY_USER CI_DEPLOY_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Internal,
    Private,
    Other(String),
}

impl Visibility {
    /// Unset visibility is treated as private.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            None => Visibility::Private,
            Some(v) => match v.as_str() {
                "public" => Visibility::Public,
                "internal" => Visibility::Internal,
                "private" => Visibility::Private,
                _ => Visibility::Other(v),
            },
        }
    }

    pub fn needs_credentials(&self) -> bool {
        !matches!(self, Visibility::Public)
    }
}

/// Values are empty when the variable is unset; `validate` reports those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl RegistryCredentials {
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let value = |name: &str| env.get(name).unwrap_or_default().to_string();
        Self {
            registry: value("CI_REGISTRY"),
            username: value("CI_DEPLOY_USER"),
            password: value("CI_DEPLOY_PASSWORD"),
        }
    }

    pub fn is_complete(&self) -> bool {
        !(self.registry.is_empty() || self.username.is_empty() || self.password.is_empty())
    }
}

/// Credentials are required only when the project is not public.
pub fn validate(env: &EnvSnapshot, visibility: &Visibility) -> Result<()> {
    if visibility.needs_credentials() {
        env.require(REGISTRY_VARS)
    } else {
        Ok(())
    }
}

/// Empty for public projects, otherwise always the three `imagePullSecret`
/// flags whatever the credential values are.
pub fn build(visibility: &Visibility, credentials: &RegistryCredentials) -> Vec<SetFlag> {
    if !visibility.needs_credentials() {
        return Vec::new();
    }
    vec![
        SetFlag::new("imagePullSecret.registry", &credentials.registry),
        SetFlag::new("imagePullSecret.username", &credentials.username),
        SetFlag::secret("imagePullSecret.password", &credentials.password),
    ]
}
