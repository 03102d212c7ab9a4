//! Typed deployment settings resolved once from the environment snapshot.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::deploy_args::{self, SetFlag};
use crate::env::EnvSnapshot;
use crate::image_pull::{RegistryCredentials, Visibility};
use crate::{dlog_warn, Error, Result};

pub const CORE_VARS: &str =
    "CI_PROJECT_NAME CI_PROJECT_DIR CI_COMMIT_REF_SLUG CI_REGISTRY_IMAGE CI_JOB_ID CI_COMMIT_SHORT_SHA";
pub const FALLBACK_VARS: &str =
    "CI_ENVIRONMENT_NAME:CI_COMMIT_REF_SLUG CI_ENVIRONMENT_SLUG:CI_COMMIT_REF_SLUG";
pub const LOGIN_VARS: &str = "PROJECT_NAMESPACE HELM_TOKEN HELM_USER CLUSTER_SERVER";

/// Helm 2 release names are DNS-1123 labels capped at 53 characters.
const MAX_RELEASE_NAME_LEN: usize = 53;
static RELEASE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub namespace: String,
    #[serde(skip)]
    pub helm_token: String,
    pub helm_user: String,
    pub cluster_server: String,
    pub project_name: String,
    pub project_dir: PathBuf,
    pub ref_slug: String,
    pub registry_image: String,
    pub environment_name: String,
    pub environment_slug: String,
    pub environment_url: Option<String>,
    pub job_id: String,
    pub commit_short_sha: String,
    #[serde(serialize_with = "serialize_visibility")]
    pub visibility: Visibility,
    #[serde(skip)]
    pub registry: RegistryCredentials,
    pub deployment_name_override: Option<String>,
    pub watch_deployment: Option<String>,
    #[serde(serialize_with = "serialize_flags")]
    pub deploy_args: Vec<SetFlag>,
}

fn serialize_visibility<S: serde::Serializer>(v: &Visibility, s: S) -> std::result::Result<S::Ok, S::Error> {
    let name = match v {
        Visibility::Public => "public",
        Visibility::Internal => "internal",
        Visibility::Private => "private",
        Visibility::Other(other) => other.as_str(),
    };
    s.serialize_str(name)
}

fn serialize_flags<S: serde::Serializer>(flags: &[SetFlag], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(flags.iter().map(|f| f.key.as_str()))
}

fn required(env: &EnvSnapshot, name: &str) -> Result<String> {
    env.get(name)
        .map(String::from)
        .ok_or_else(|| Error::MissingRequiredVariable {
            names: vec![name.to_string()],
        })
}

fn with_fallback(env: &EnvSnapshot, name: &str, fallback: &str) -> Result<String> {
    env.resolve_with_fallback(name, fallback)
        .map(String::from)
        .ok_or_else(|| Error::MissingDefaultableVariable {
            name: name.to_string(),
            fallback: fallback.to_string(),
        })
}

impl Settings {
    pub fn from_env(env: &EnvSnapshot) -> Result<Self> {
        let ref_slug = required(env, "CI_COMMIT_REF_SLUG")?;
        Ok(Self {
            namespace: required(env, "PROJECT_NAMESPACE")?,
            helm_token: required(env, "HELM_TOKEN")?,
            helm_user: required(env, "HELM_USER")?,
            cluster_server: required(env, "CLUSTER_SERVER")?,
            project_name: required(env, "CI_PROJECT_NAME")?,
            project_dir: PathBuf::from(required(env, "CI_PROJECT_DIR")?),
            registry_image: required(env, "CI_REGISTRY_IMAGE")?,
            environment_name: with_fallback(env, "CI_ENVIRONMENT_NAME", "CI_COMMIT_REF_SLUG")?,
            environment_slug: with_fallback(env, "CI_ENVIRONMENT_SLUG", "CI_COMMIT_REF_SLUG")?,
            environment_url: env.get("CI_ENVIRONMENT_URL").map(String::from),
            job_id: required(env, "CI_JOB_ID")?,
            commit_short_sha: required(env, "CI_COMMIT_SHORT_SHA")?,
            visibility: Visibility::parse(env.get("CI_PROJECT_VISIBILITY")),
            registry: RegistryCredentials::from_env(env),
            deployment_name_override: env.get("DEPLOYMENT_NAME").map(String::from),
            watch_deployment: env.get("WATCH_DEPLOYMENT").map(String::from),
            deploy_args: deploy_args::build(env),
            ref_slug,
        })
    }

    /// `DEPLOYMENT_NAME` if set, else `<env slug>-<project name>`.
    pub fn deployment_name(&self) -> String {
        match &self.deployment_name_override {
            Some(name) => name.clone(),
            None => format!("{}-{}", self.environment_slug, self.project_name),
        }
    }

    /// `WATCH_DEPLOYMENT` if set, else the deployment name.
    pub fn watch_target(&self) -> String {
        self.watch_deployment
            .clone()
            .unwrap_or_else(|| self.deployment_name())
    }

    pub fn chart_path(&self, chart_root: &str) -> PathBuf {
        self.project_dir.join(chart_root).join(&self.project_name)
    }

    pub fn cluster_name(&self) -> String {
        format!("{}-cluster", self.namespace)
    }

    pub fn context_name(&self) -> String {
        format!("{}-context", self.namespace)
    }

    /// Label selector shared by the describe commands of the watch step.
    pub fn release_selector(&self) -> String {
        format!(
            "app={},environment={},commitSha={}",
            self.project_name, self.environment_slug, self.commit_short_sha
        )
    }

    /// Warns about release names helm is likely to reject.
    pub fn check_release_name(&self) -> bool {
        let name = self.deployment_name();
        let valid = name.len() <= MAX_RELEASE_NAME_LEN && RELEASE_NAME_RE.is_match(&name);
        if !valid {
            dlog_warn!(
                "Release name {:?} is not a lowercase DNS-1123 label of at most {} characters",
                name,
                MAX_RELEASE_NAME_LEN
            );
        }
        valid
    }
}
