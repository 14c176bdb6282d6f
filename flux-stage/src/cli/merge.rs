use clap::Args;
use log::info;

use super::common::{ApiArgs, ReleaseArgs, WorkspaceArgs};
use crate::{
    context::DeploymentContext,
    pipeline::{MergeOutcome, Pipeline, SubmittedPullRequest},
    Result,
};

#[derive(Debug, Args)]
pub struct MergeArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub api: ApiArgs,
}

fn ensure_mergeable(context: &DeploymentContext) -> Result<()> {
    if context.environment.auto_merges() {
        Ok(())
    } else {
        Err(format!(
            "refusing to merge, deployments from {branch:?} target {environment} and require review",
            branch = context.source_branch,
            environment = context.environment
        )
        .into())
    }
}

pub fn merge(args: MergeArgs, dry_run: bool) -> Result<()> {
    let context = args.release.resolve()?;
    ensure_mergeable(&context)?;

    let workspace = args.workspace.workspace();
    let pipeline = Pipeline {
        context: &context,
        workspace: &workspace,
        dry_run,
    };
    let submitted = SubmittedPullRequest {
        response_file: workspace.pull_request_file(&context),
        html_url: None,
    };

    if let MergeOutcome::Merged { sha } = pipeline.merge(&args.api.client()?, &submitted)? {
        info!(
            "Merged release {release} {commit}, merge commit {sha}.",
            release = context.release_name,
            commit = context.commit_hash,
            sha = sha.as_deref().unwrap_or("unknown")
        );
    }

    Ok(())
}
