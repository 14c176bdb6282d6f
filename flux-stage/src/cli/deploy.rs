use clap::Args;
use log::info;

use super::common::{ChartArgs, GitOpsArgs, ProvenanceArgs, ReleaseArgs, ToolArgs, WorkspaceArgs};
use crate::{
    chart::GitChartFetcher,
    context::DeploymentContext,
    gitops::GitStager,
    pipeline::{Checks, MergeOutcome, Pipeline, ValidatedManifest},
    render::HelmRenderer,
    validate::{Checkov, Kubeval},
    workspace::Workspace,
    Result,
};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub chart: ChartArgs,

    #[command(flatten)]
    pub tools: ToolArgs,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub validate: ValidateArgs,

    #[command(flatten)]
    pub gitops: GitOpsArgs,

    #[command(flatten)]
    pub provenance: ProvenanceArgs,
}

/// Fetches the chart, renders the manifest and runs the checks on it.
fn check(args: &ValidateArgs, pipeline: &Pipeline) -> Result<ValidatedManifest> {
    let helm_version = args.tools.helm_version.to_string();
    let skip_kinds = args.tools.skip_kinds();
    let skip_checks = args.tools.skip_checks();

    let chart = pipeline.fetch_chart(&GitChartFetcher, &args.chart.source())?;
    let manifest = pipeline.render(
        &HelmRenderer {
            version: &helm_version,
        },
        &chart,
    )?;
    pipeline.validate(
        &Checks {
            schema: &Kubeval {
                version: &args.tools.kubeval_version,
                skip_kinds: &skip_kinds,
            },
            policy: &Checkov {
                version: &args.tools.checkov_version,
                skip_checks: &skip_checks,
            },
        },
        manifest,
    )
}

fn pipeline<'a>(
    context: &'a DeploymentContext,
    workspace: &'a Workspace,
    dry_run: bool,
) -> Pipeline<'a> {
    Pipeline {
        context,
        workspace,
        dry_run,
    }
}

pub fn validate(args: ValidateArgs, dry_run: bool) -> Result<()> {
    let context = args.release.resolve()?;
    let workspace = args.workspace.workspace();
    let pipeline = pipeline(&context, &workspace, dry_run);

    let manifest = check(&args, &pipeline)?;

    if !dry_run {
        info!(
            "Manifest {path} is valid{scanned}.",
            path = manifest.path.display(),
            scanned = if manifest.policy_scanned {
                " and passed the policy scan"
            } else {
                ""
            }
        );
    }

    Ok(())
}

pub fn deploy(args: DeployArgs, dry_run: bool) -> Result<()> {
    let context = args.validate.release.resolve()?;
    let workspace = args.validate.workspace.workspace();
    let pipeline = pipeline(&context, &workspace, dry_run);

    let repository = args.gitops.repository();
    let provenance = args.provenance.provenance();
    let author = args.provenance.author();
    let client = args.gitops.api.client()?;

    let manifest = check(&args.validate, &pipeline)?;
    let staged = pipeline.stage(&GitStager { author: &author }, &repository, &provenance, &manifest)?;
    let submitted = pipeline.submit(&client, &repository, &provenance, &staged)?;

    match pipeline.merge(&client, &submitted)? {
        MergeOutcome::Merged { sha } => info!(
            "Released {release} {commit} to {app_instance}, merge commit {sha}.",
            release = context.release_name,
            commit = context.commit_hash,
            app_instance = context.app_instance,
            sha = sha.as_deref().unwrap_or("unknown")
        ),
        MergeOutcome::LeftOpen => info!(
            "Release pull request for {release} {commit} awaits review{url}.",
            release = context.release_name,
            commit = context.commit_hash,
            url = submitted
                .html_url
                .as_deref()
                .map(|url| format!(" at {url}"))
                .unwrap_or_default()
        ),
        MergeOutcome::DryRun => info!("[dry-run] Done, nothing was changed."),
    }

    Ok(())
}
