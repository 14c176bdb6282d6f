//! Derives every environment specific identifier of a deployment from the release name, the source
//! branch and the commit hash. Resolution is pure: it reads nothing from the process environment
//! and the resulting [`DeploymentContext`] is passed explicitly to every later step.

use std::fmt;

use log::warn;

use crate::name::{is_commit_hash_like, is_rfc_1123_label};

/// Source branches that deploy to production.
pub const PRODUCTION_BRANCHES: &[&str] = &["main", "master"];

/// Instance name used for both the application and the GitOps tree in production.
pub const PRODUCTION_INSTANCE: &str = "prod";

/// Application instance used for non-production branches when no override is given.
pub const DEFAULT_APP_INSTANCE: &str = "test";

/// GitOps instance shared by every non-production application instance.
pub const DEVELOPMENT_FLUX_INSTANCE: &str = "dev";

/// Directory of the GitOps repository holding one subdirectory per flux instance.
pub const RELEASES_DIR: &str = "releases";

const MANIFEST_EXTENSION: &str = "yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn of_branch(source_branch: &str) -> Self {
        if PRODUCTION_BRANCHES.contains(&source_branch) {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    /// Production changes require review, their pull requests are never merged by the pipeline.
    pub const fn auto_merges(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Production => "production",
            Environment::Development => "development",
        })
    }
}

/// The fixed cloud projects deployments land in.
#[derive(Debug, Clone, Copy)]
pub struct Targets<'a> {
    pub production: &'a str,
    pub development: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextInputs<'a> {
    pub release_name: &'a str,
    pub commit_hash: &'a str,
    pub source_branch: &'a str,
    pub app_instance: Option<&'a str>,
    pub targets: Targets<'a>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ContextError {
    Missing(&'static str),
    InvalidLabel { field: &'static str, value: String },
    InvalidCommitHash(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Missing(field) => write!(f, "required value `{field}` is missing or empty"),
            ContextError::InvalidLabel { field, value } => write!(
                f,
                "`{field}` must be an RFC 1123 label matching /^[a-z0-9]([-a-z0-9]*[a-z0-9])?$/, got {value:?}"
            ),
            ContextError::InvalidCommitHash(value) => write!(
                f,
                "`commit_hash` must consist of ASCII letters and digits, got {value:?}"
            ),
        }
    }
}

impl std::error::Error for ContextError {}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeploymentContext {
    pub release_name: String,
    pub commit_hash: String,
    pub source_branch: String,
    pub environment: Environment,
    pub app_instance: String,
    pub flux_instance: String,
    pub target_project: String,
    pub manifest_file_name: String,
    pub release_branch_name: String,
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ContextError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ContextError::Missing(field))
    } else {
        Ok(value)
    }
}

fn label<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ContextError> {
    if is_rfc_1123_label(value) {
        Ok(value)
    } else {
        Err(ContextError::InvalidLabel {
            field,
            value: value.to_owned(),
        })
    }
}

impl DeploymentContext {
    pub fn resolve(inputs: ContextInputs) -> Result<Self, ContextError> {
        let ContextInputs {
            release_name,
            commit_hash,
            source_branch,
            app_instance,
            targets,
        } = inputs;

        let release_name = label("release_name", required("release_name", release_name)?)?;
        let commit_hash = required("commit_hash", commit_hash)?;
        if !is_commit_hash_like(commit_hash) {
            return Err(ContextError::InvalidCommitHash(commit_hash.to_owned()));
        }
        let source_branch = required("source_branch", source_branch)?;
        // An empty override behaves like an unset one.
        let app_instance = app_instance.map(str::trim).filter(|value| !value.is_empty());

        let environment = Environment::of_branch(source_branch);

        let (app_instance, flux_instance, target_project) = match environment {
            Environment::Production => {
                if let Some(ignored) = app_instance.filter(|&value| value != PRODUCTION_INSTANCE) {
                    warn!("Ignoring app instance {ignored:?}, deployments from {source_branch:?} always target {PRODUCTION_INSTANCE:?}.");
                }
                (
                    PRODUCTION_INSTANCE,
                    PRODUCTION_INSTANCE,
                    targets.production,
                )
            }
            Environment::Development => (
                label("app_instance", app_instance.unwrap_or(DEFAULT_APP_INSTANCE))?,
                DEVELOPMENT_FLUX_INSTANCE,
                targets.development,
            ),
        };

        // Named instances share the dev tree of the GitOps repository, the suffix keeps their
        // manifests apart.
        let manifest_file_name = match environment {
            Environment::Development if app_instance != DEFAULT_APP_INSTANCE => {
                format!("{release_name}-{app_instance}.{MANIFEST_EXTENSION}")
            }
            _ => format!("{release_name}.{MANIFEST_EXTENSION}"),
        };

        let release_branch_name = format!("release/{flux_instance}/{release_name}/{commit_hash}");

        Ok(DeploymentContext {
            release_name: release_name.to_owned(),
            commit_hash: commit_hash.to_owned(),
            source_branch: source_branch.to_owned(),
            environment,
            app_instance: app_instance.to_owned(),
            flux_instance: flux_instance.to_owned(),
            target_project: target_project.to_owned(),
            manifest_file_name,
            release_branch_name,
        })
    }

    /// Path of the manifest inside the GitOps repository.
    pub fn manifest_repo_path(&self) -> String {
        format!(
            "{RELEASES_DIR}/{flux_instance}/{file_name}",
            flux_instance = self.flux_instance,
            file_name = self.manifest_file_name
        )
    }

    /// Identifies the artifacts of one deployment, e.g. the saved pull request response.
    pub fn artifact_key(&self) -> String {
        format!(
            "{flux_instance}-{release_name}-{commit_hash}",
            flux_instance = self.flux_instance,
            release_name = self.release_name,
            commit_hash = self.commit_hash
        )
    }

    /// Field names and values in a stable order, for display.
    pub fn fields(&self) -> [(&'static str, String); 9] {
        [
            ("release name", self.release_name.clone()),
            ("commit hash", self.commit_hash.clone()),
            ("source branch", self.source_branch.clone()),
            ("environment", self.environment.to_string()),
            ("app instance", self.app_instance.clone()),
            ("flux instance", self.flux_instance.clone()),
            ("target project", self.target_project.clone()),
            ("manifest file", self.manifest_file_name.clone()),
            ("release branch", self.release_branch_name.clone()),
        ]
    }
}
