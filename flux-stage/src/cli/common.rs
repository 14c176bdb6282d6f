use std::path::PathBuf;

use clap::Args;
use constcat::concat;
use log::info;
use secrecy::SecretString;

use crate::{
    context::{ContextInputs, DeploymentContext, Targets},
    git,
    gitops::GitOpsRepository,
    name::is_repository_slug,
    pipeline::{ChartSource, Provenance},
    pull_request::GitHubClient,
    redact,
    validate::{self, split_list},
    workspace::Workspace,
    Result,
};

fn repository_slug(value: &str) -> Result<String, &'static str> {
    if is_repository_slug(value) {
        Ok(value.to_owned())
    } else {
        Err("expected a repository in the form `owner/name`")
    }
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Name of the release. Used as Helm release name and in manifest and branch names.
    #[arg(long = "release-name", env = "RELEASE_NAME")]
    pub release_name: String,

    /// The commit being deployed. Used verbatim as image tag.
    #[arg(long = "commit-hash", env = "COMMIT_HASH")]
    pub commit_hash: String,

    /// The branch the commit was built from. `main` and `master` deploy to production.
    #[arg(long = "branch", env = "GIT_REPO_BRANCH")]
    pub branch: String,

    /// Application instance for non-production branches, e.g. `eval`. Defaults to `test`.
    #[arg(long = "app-instance", env = "APP_INSTANCE")]
    pub app_instance: Option<String>,

    /// Cloud project production deployments target.
    #[arg(long = "prod-project", env = "GCP_PROD_PROJECT", default_value = "production")]
    pub prod_project: String,

    /// Cloud project all other deployments target.
    #[arg(long = "dev-project", env = "GCP_DEV_PROJECT", default_value = "development")]
    pub dev_project: String,
}

impl ReleaseArgs {
    /// Resolves the deployment context without logging it.
    pub fn context(&self) -> Result<DeploymentContext> {
        Ok(DeploymentContext::resolve(ContextInputs {
            release_name: &self.release_name,
            commit_hash: &self.commit_hash,
            source_branch: &self.branch,
            app_instance: self.app_instance.as_deref(),
            targets: Targets {
                production: &self.prod_project,
                development: &self.dev_project,
            },
        })?)
    }

    /// Resolves the deployment context and logs every field.
    pub fn resolve(&self) -> Result<DeploymentContext> {
        let context = self.context()?;
        info!("Resolved deployment context:");
        for (field, value) in context.fields() {
            info!("  {field}: {value}");
        }
        Ok(context)
    }
}

#[derive(Debug, Args)]
pub struct WorkspaceArgs {
    /// Directory for chart and GitOps checkouts, the rendered manifest and the saved pull request.
    #[arg(long = "work-dir", env = "FLUX_STAGE_WORK_DIR", default_value = ".flux-stage")]
    pub work_dir: PathBuf,

    /// Directory containing one `<app instance>-values.yml` file per instance.
    #[arg(long = "values-dir", env = "HELM_VALUES_DIR", default_value = "helm")]
    pub values_dir: PathBuf,

    /// Location of the chart inside the chart repository.
    #[arg(long = "chart-path", env = "HELM_CHART_PATH", default_value = ".")]
    pub chart_path: PathBuf,
}

impl WorkspaceArgs {
    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.work_dir, &self.values_dir, &self.chart_path)
    }
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    /// Git URL of the chart repository.
    #[arg(long = "chart-repo", env = "HELM_CHART_REPO")]
    pub chart_repo: String,

    #[arg(long = "chart-branch", env = "HELM_CHART_BRANCH", default_value = "master")]
    pub chart_branch: String,
}

impl ChartArgs {
    pub fn source(&self) -> ChartSource<'_> {
        ChartSource {
            repository: &self.chart_repo,
            branch: &self.chart_branch,
        }
    }
}

#[derive(Debug, Args)]
pub struct ToolArgs {
    /// Version of the `alpine/helm` image used for rendering.
    #[arg(long = "helm-version", env = "HELM_APP_VERSION", default_value = "3.4.2")]
    pub helm_version: semver::Version,

    /// Tag of the `garethr/kubeval` image.
    #[arg(long = "kubeval-version", env = "KUBEVAL_VERSION", default_value = "latest")]
    pub kubeval_version: String,

    /// Comma separated resource kinds exempt from schema validation.
    #[arg(long = "kubeval-skip-kinds", env = "KUBEVAL_SKIP_KINDS", default_value = validate::DEFAULT_SKIP_KINDS)]
    pub kubeval_skip_kinds: String,

    /// Tag of the `bridgecrew/checkov` image.
    #[arg(long = "checkov-version", env = "CHECKOV_VERSION", default_value = "latest")]
    pub checkov_version: String,

    #[arg(long = "checkov-skip-checks", env = "CHECKOV_SKIP_CHECKS", default_value = validate::DEFAULT_SKIP_CHECKS, help = concat!("Comma separated policy checks to accept. The scan only runs for manifests containing `", validate::SECURITY_CONTEXT_MARKER, "`."))]
    pub checkov_skip_checks: String,
}

impl ToolArgs {
    pub fn skip_kinds(&self) -> Vec<String> {
        split_list(&self.kubeval_skip_kinds)
    }

    pub fn skip_checks(&self) -> Vec<String> {
        split_list(&self.checkov_skip_checks)
    }
}

#[derive(Debug, Args)]
pub struct ApiArgs {
    /// Base URL of the git hosting REST API.
    #[arg(long = "github-api-url", env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub api_url: String,

    /// Access token for cloning, pushing and the REST API.
    #[arg(long = "token", env = "GH_AUTH_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl ApiArgs {
    fn token(&self) -> SecretString {
        redact::secret(&self.token)
    }

    pub fn client(&self) -> Result<GitHubClient> {
        GitHubClient::new(&self.api_url, self.token())
    }
}

#[derive(Debug, Args)]
pub struct GitOpsArgs {
    /// The GitOps repository as `owner/name`.
    #[arg(long = "flux-repo", env = "FLUX_REPO_SLUG", value_parser = repository_slug)]
    pub flux_repo: String,

    /// Default branch of the GitOps repository, release pull requests target it.
    #[arg(long = "flux-branch", env = "FLUX_REPO_BRANCH", default_value = "main")]
    pub flux_branch: String,

    #[arg(long = "flux-host", env = "FLUX_REPO_HOST", default_value = "github.com")]
    pub flux_host: String,

    #[command(flatten)]
    pub api: ApiArgs,
}

impl GitOpsArgs {
    pub fn repository(&self) -> GitOpsRepository {
        GitOpsRepository {
            slug: self.flux_repo.clone(),
            base_branch: self.flux_branch.clone(),
            host: self.flux_host.clone(),
            token: self.api.token(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ProvenanceArgs {
    /// The application repository as `owner/name`.
    #[arg(long = "repo-slug", env = "GIT_REPO_SLUG")]
    pub repo_slug: String,

    /// Identifier of the CI build.
    #[arg(long = "build-number", env = "BUILD_NUMBER")]
    pub build_number: String,

    /// Link to the CI build.
    #[arg(long = "build-url", env = "BUILD_WEB_URL")]
    pub build_web_url: String,

    #[arg(long = "git-author-name", env = "GIT_AUTHOR_NAME", default_value = "flux-stage")]
    pub author_name: String,

    #[arg(
        long = "git-author-email",
        env = "GIT_AUTHOR_EMAIL",
        default_value = "flux-stage@users.noreply.github.com"
    )]
    pub author_email: String,
}

impl ProvenanceArgs {
    pub fn provenance(&self) -> Provenance<'_> {
        Provenance {
            repo_slug: &self.repo_slug,
            build_number: &self.build_number,
            build_web_url: &self.build_web_url,
        }
    }

    pub fn author(&self) -> git::Author {
        git::Author {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        }
    }
}
