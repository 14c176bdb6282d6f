mod build;
mod common;
mod deploy;
mod merge;
mod show;

use clap::{Parser, Subcommand};
use log::info;

use crate::{version::VERSION, Result};

#[derive(Debug, Parser)]
#[command(version = VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Announce every mutating step instead of running it. Names and instances are still resolved.
    #[arg(
        long = "dry-run",
        env = "DRY_RUN",
        global = true,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the deployment context resolved from the release inputs
    Context(show::ShowArgs),

    /// Build the application image and push it to the registry of the target project
    Build(build::BuildImageArgs),

    /// Fetch the chart, render the manifest and validate it
    Validate(deploy::ValidateArgs),

    /// Render and validate the manifest, then stage it as a pull request against the GitOps
    /// repository and merge it for non-production branches
    Deploy(deploy::DeployArgs),

    /// Merge the pull request saved by a previous `deploy`
    Merge(merge::MergeArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        if self.dry_run {
            info!("Dry run: mutating steps are announced but not performed.");
        }

        match self.command {
            Commands::Context(args) => show::show(args),
            Commands::Build(args) => build::build(args, self.dry_run),
            Commands::Validate(args) => deploy::validate(args, self.dry_run),
            Commands::Deploy(args) => deploy::deploy(args, self.dry_run),
            Commands::Merge(args) => merge::merge(args, self.dry_run),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    fn deploy_argv(flux_repo: &'static str) -> Vec<&'static str> {
        vec![
            "flux-stage",
            "deploy",
            "--dry-run",
            "--release-name",
            "foo",
            "--commit-hash",
            "abc1234",
            "--branch",
            "develop",
            "--app-instance",
            "eval",
            "--chart-repo",
            "https://github.com/acme/charts.git",
            "--helm-version",
            "3.4.2",
            "--flux-repo",
            flux_repo,
            "--token",
            "ghp_cliTestToken7Qm2",
            "--repo-slug",
            "acme/web",
            "--build-number",
            "117",
            "--build-url",
            "https://ci.example.com/acme/web/117",
        ]
    }

    #[test]
    fn deploy_flags_parse() {
        let cli = Cli::try_parse_from(deploy_argv("acme/flux")).unwrap();

        assert!(cli.dry_run);
        let Commands::Deploy(args) = cli.command else {
            panic!("expected the deploy command");
        };
        let context = args.validate.release.context().unwrap();
        assert_eq!(context.release_branch_name, "release/dev/foo/abc1234");
        assert_eq!(context.manifest_repo_path(), "releases/dev/foo-eval.yaml");
        assert_eq!(args.validate.tools.helm_version, semver::Version::new(3, 4, 2));
        assert_eq!(args.gitops.repository().slug, "acme/flux");
    }

    #[test]
    fn invalid_flux_repo_is_rejected() {
        let error = Cli::try_parse_from(deploy_argv("flux")).unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn helm_version_must_be_semver() {
        let error = Cli::try_parse_from([
            "flux-stage",
            "validate",
            "--release-name",
            "foo",
            "--commit-hash",
            "abc1234",
            "--branch",
            "develop",
            "--chart-repo",
            "https://github.com/acme/charts.git",
            "--helm-version",
            "latest",
        ])
        .unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
