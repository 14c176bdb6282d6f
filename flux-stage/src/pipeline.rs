//! The deployment staging workflow: fetch chart, render, validate, stage, submit and merge.
//!
//! Each step consumes the output of the previous one and talks to the outside world only through
//! the trait objects it is handed. In dry-run mode every step announces what it would do and
//! returns without invoking its collaborator, while all names are still derived from the
//! [`DeploymentContext`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    chart::{ChartFetcher, FetchArgs},
    context::{DeploymentContext, Environment},
    gitops::{GitOpsRepository, StageArgs, Stager},
    pull_request::{CreatePullRequest, MergePullRequest, PullRequest, PullRequestApi},
    redact::redact,
    render::{self, RenderArgs, Renderer},
    validate::{self, ManifestCheck, SECURITY_CONTEXT_MARKER},
    workspace::Workspace,
    Result,
};

/// Where the deployed commit came from, for commit messages and pull request descriptions.
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub repo_slug: &'a str,
    pub build_number: &'a str,
    pub build_web_url: &'a str,
}

impl Provenance<'_> {
    pub fn commit_message(&self, context: &DeploymentContext) -> String {
        format!(
            "Release {release_name} {commit_hash} to {flux_instance}/{app_instance}\n\nSource: {repo_slug}@{commit_hash}\nBuild: {build_number}\n",
            release_name = context.release_name,
            commit_hash = context.commit_hash,
            flux_instance = context.flux_instance,
            app_instance = context.app_instance,
            repo_slug = self.repo_slug,
            build_number = self.build_number,
        )
    }

    pub fn pull_request_title(&self, context: &DeploymentContext) -> String {
        format!(
            "Release {release_name} {commit_hash} to {app_instance}",
            release_name = context.release_name,
            commit_hash = context.commit_hash,
            app_instance = context.app_instance,
        )
    }

    pub fn pull_request_body(&self, context: &DeploymentContext) -> String {
        let mut body = format!(
            "Automated release of `{release_name}` from {repo_slug}@{commit_hash}.\n\n\
            - Source branch: `{source_branch}`\n\
            - Instance: `{app_instance}` on `{flux_instance}`\n\
            - Manifest: `{manifest}`\n\
            - Build: [{build_number}]({build_web_url})\n",
            release_name = context.release_name,
            repo_slug = self.repo_slug,
            commit_hash = context.commit_hash,
            source_branch = context.source_branch,
            app_instance = context.app_instance,
            flux_instance = context.flux_instance,
            manifest = context.manifest_repo_path(),
            build_number = self.build_number,
            build_web_url = self.build_web_url,
        );
        if context.environment == Environment::Production {
            body.push_str("\nThis release targets production and has to be reviewed before merging.\n");
        }
        body
    }
}

/// Location of the chart definition.
#[derive(Debug, Clone, Copy)]
pub struct ChartSource<'a> {
    pub repository: &'a str,
    pub branch: &'a str,
}

/// The checks a rendered manifest has to pass.
pub struct Checks<'a> {
    pub schema: &'a dyn ManifestCheck,
    /// Only consulted for manifests containing [`SECURITY_CONTEXT_MARKER`].
    pub policy: &'a dyn ManifestCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartCheckout {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedManifest {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedManifest {
    pub path: PathBuf,
    pub policy_scanned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRelease {
    pub branch: String,
    /// Path of the manifest inside the GitOps repository.
    pub destination: String,
    /// `None` in dry-run mode.
    pub commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedPullRequest {
    /// The raw creation response, the merge step reads the pull request from here.
    pub response_file: PathBuf,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { sha: Option<String> },
    /// Production pull requests wait for review.
    LeftOpen,
    DryRun,
}

pub struct Pipeline<'a> {
    pub context: &'a DeploymentContext,
    pub workspace: &'a Workspace,
    pub dry_run: bool,
}

impl Pipeline<'_> {
    pub fn fetch_chart(
        &self,
        fetcher: &dyn ChartFetcher,
        source: &ChartSource,
    ) -> Result<ChartCheckout> {
        let dest = self.workspace.chart_checkout_dir();
        let checkout = ChartCheckout {
            dir: self.workspace.chart_dir(),
        };
        let repository = redact(source.repository);

        if self.dry_run {
            info!(
                "[dry-run] Would fetch chart {repository}@{branch} into {dest}.",
                branch = source.branch,
                dest = dest.display()
            );
            return Ok(checkout);
        }

        info!(
            "Fetching chart {repository}@{branch} into {dest}...",
            branch = source.branch,
            dest = dest.display()
        );
        fs::create_dir_all(self.workspace.root())?;
        fetcher.fetch(FetchArgs {
            repository: source.repository,
            branch: source.branch,
            dest: &dest,
        })?;

        Ok(checkout)
    }

    pub fn render(&self, renderer: &dyn Renderer, chart: &ChartCheckout) -> Result<RenderedManifest> {
        let context = self.context;
        let values_file = self.workspace.values_file(context);
        let path = self.workspace.manifest_file(context);

        if self.dry_run {
            info!(
                "[dry-run] Would render release {release} from {chart} with {values} and image tag {tag} into {path}.",
                release = context.release_name,
                chart = chart.dir.display(),
                values = values_file.display(),
                tag = context.commit_hash,
                path = path.display()
            );
            return Ok(RenderedManifest { path });
        }

        info!(
            "Rendering release {release} from {chart} with {values} and image tag {tag} into {path}...",
            release = context.release_name,
            chart = chart.dir.display(),
            values = values_file.display(),
            tag = context.commit_hash,
            path = path.display()
        );
        let manifest = renderer.render(RenderArgs {
            release_name: &context.release_name,
            chart_dir: &chart.dir,
            values_file: &values_file,
            image_tag: &context.commit_hash,
        })?;

        let summary = render::summarize(&manifest)?;
        info!(
            "Rendered {count} resources: {kinds}.",
            count = summary.kinds.len(),
            kinds = summary.kinds.join(", ")
        );

        fs::create_dir_all(self.workspace.root())?;
        fs::write(&path, manifest)?;

        Ok(RenderedManifest { path })
    }

    pub fn validate(&self, checks: &Checks, manifest: RenderedManifest) -> Result<ValidatedManifest> {
        let RenderedManifest { path } = manifest;

        if self.dry_run {
            info!(
                "[dry-run] Would run {check} on {path}.",
                check = checks.schema.name(),
                path = path.display()
            );
            info!(
                "[dry-run] Would run {check} on {path} if it contains {SECURITY_CONTEXT_MARKER:?}.",
                check = checks.policy.name(),
                path = path.display()
            );
            return Ok(ValidatedManifest {
                path,
                policy_scanned: false,
            });
        }

        info!(
            "Running {check} on {path}...",
            check = checks.schema.name(),
            path = path.display()
        );
        checks.schema.check(&path)?;

        let policy_scanned = validate::needs_policy_scan(&fs::read_to_string(&path)?);
        if policy_scanned {
            info!(
                "Running {check} on {path}...",
                check = checks.policy.name(),
                path = path.display()
            );
            checks.policy.check(&path)?;
        } else {
            info!(
                "Skipping {check}, {path} does not contain {SECURITY_CONTEXT_MARKER:?}.",
                check = checks.policy.name(),
                path = path.display()
            );
        }

        Ok(ValidatedManifest {
            path,
            policy_scanned,
        })
    }

    pub fn stage(
        &self,
        stager: &dyn Stager,
        repository: &GitOpsRepository,
        provenance: &Provenance,
        manifest: &ValidatedManifest,
    ) -> Result<StagedRelease> {
        let branch = &self.context.release_branch_name;
        let destination = self.context.manifest_repo_path();

        if self.dry_run {
            info!(
                "[dry-run] Would stage {path} as {destination} on new branch {branch} of {slug}.",
                path = manifest.path.display(),
                slug = repository.slug
            );
            return Ok(StagedRelease {
                branch: branch.clone(),
                destination,
                commit: None,
            });
        }

        info!(
            "Staging {path} as {destination} on new branch {branch} of {slug}...",
            path = manifest.path.display(),
            slug = repository.slug
        );
        let commit_message = provenance.commit_message(self.context);
        let output = stager.stage(StageArgs {
            repository,
            checkout_dir: &self.workspace.gitops_dir(),
            branch,
            manifest: &manifest.path,
            destination: &destination,
            commit_message: &commit_message,
        })?;
        info!("Pushed branch {branch} at {commit}.", commit = output.commit);

        Ok(StagedRelease {
            branch: branch.clone(),
            destination,
            commit: Some(output.commit),
        })
    }

    pub fn submit(
        &self,
        pulls: &dyn PullRequestApi,
        repository: &GitOpsRepository,
        provenance: &Provenance,
        staged: &StagedRelease,
    ) -> Result<SubmittedPullRequest> {
        let response_file = self.workspace.pull_request_file(self.context);
        let title = provenance.pull_request_title(self.context);
        let body = provenance.pull_request_body(self.context);
        let request = CreatePullRequest {
            title: &title,
            body: &body,
            head: &staged.branch,
            base: &repository.base_branch,
        };

        if self.dry_run {
            info!(
                "[dry-run] Would open pull request {head} -> {base} on {slug} and save the response to {file}.",
                head = request.head,
                base = request.base,
                slug = repository.slug,
                file = response_file.display()
            );
            return Ok(SubmittedPullRequest {
                response_file,
                html_url: None,
            });
        }

        info!(
            "Opening pull request {head} -> {base} on {slug}...",
            head = request.head,
            base = request.base,
            slug = repository.slug
        );
        let response = pulls.create(&repository.slug, &request)?;
        fs::write(&response_file, &response)?;

        let pull_request = read_pull_request(&response, &response_file)?;
        info!(
            "Opened pull request #{number} from {head_ref}: {url}",
            number = pull_request.number,
            head_ref = pull_request.head.ref_,
            url = pull_request.html_url
        );

        Ok(SubmittedPullRequest {
            response_file,
            html_url: Some(pull_request.html_url),
        })
    }

    /// Merges the submitted pull request unless the context targets production. The pull request is
    /// read back from the saved response, so this step can run on its own after a `submit`.
    pub fn merge(
        &self,
        pulls: &dyn PullRequestApi,
        submitted: &SubmittedPullRequest,
    ) -> Result<MergeOutcome> {
        let context = self.context;

        if !context.environment.auto_merges() {
            info!(
                "Leaving the pull request open, deployments from {branch:?} target {environment} and require review.",
                branch = context.source_branch,
                environment = context.environment
            );
            return Ok(MergeOutcome::LeftOpen);
        }

        if self.dry_run {
            info!(
                "[dry-run] Would merge the pull request saved at {file}.",
                file = submitted.response_file.display()
            );
            return Ok(MergeOutcome::DryRun);
        }

        let response = fs::read(&submitted.response_file).map_err(|error| {
            format!(
                "unable to read saved pull request {file}: {error}",
                file = submitted.response_file.display()
            )
        })?;
        let pull_request = read_pull_request(&response, &submitted.response_file)?;

        info!(
            "Merging pull request #{number}: {url}...",
            number = pull_request.number,
            url = pull_request.html_url
        );
        let result = pulls.merge(
            &pull_request.url,
            &MergePullRequest {
                sha: &pull_request.head.sha,
                commit_title: None,
            },
        )?;

        if !result.merged {
            return Err(format!(
                "pull request {url} was not merged: {message}",
                url = pull_request.html_url,
                message = result.message
            )
            .into());
        }
        info!("Merged pull request #{number}.", number = pull_request.number);

        Ok(MergeOutcome::Merged { sha: result.sha })
    }
}

fn read_pull_request(response: &[u8], file: &Path) -> Result<PullRequest> {
    serde_json::from_slice(response).map_err(|error| {
        format!(
            "unexpected pull request response saved at {file}: {error}",
            file = file.display()
        )
        .into()
    })
}
