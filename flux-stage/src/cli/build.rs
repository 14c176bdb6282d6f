use std::path::PathBuf;

use clap::Args;
use log::info;

use super::common::ReleaseArgs;
use crate::{context::DeploymentContext, docker, Result};

#[derive(Debug, Args)]
pub struct BuildImageArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,

    /// Registry host the image is pushed to, the target project becomes the first path segment.
    #[arg(long = "registry", env = "IMAGE_REGISTRY", default_value = "gcr.io")]
    pub registry: String,

    /// Docker build context.
    #[arg(long = "build-context", default_value = ".")]
    pub context_dir: PathBuf,
}

/// `<registry>/<target project>/<release name>:<commit hash>`
fn image_tag(registry: &str, context: &DeploymentContext) -> String {
    format!(
        "{registry}/{project}/{release}:{commit}",
        registry = registry.trim_end_matches('/'),
        project = context.target_project,
        release = context.release_name,
        commit = context.commit_hash
    )
}

pub fn build(args: BuildImageArgs, dry_run: bool) -> Result<()> {
    let context = args.release.resolve()?;
    let image_tag = image_tag(&args.registry, &context);

    if dry_run {
        info!(
            "[dry-run] Would build {dir} and push {image_tag}.",
            dir = args.context_dir.display()
        );
        return Ok(());
    }

    info!(
        "Building {dir} and pushing {image_tag}...",
        dir = args.context_dir.display()
    );
    let output = docker::build_and_push(docker::BuildArgs {
        context_dir: &args.context_dir,
        commit_hash: &context.commit_hash,
        image_tag: &image_tag,
    })?;
    info!(
        "Pushed {image_tag}@{digest}.",
        digest = output.image_digest
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::resolve;

    #[test]
    fn image_is_pushed_to_the_target_project() {
        assert_eq!(
            image_tag("gcr.io/", &resolve("develop", None).unwrap()),
            "gcr.io/acme-dev/foo:abc1234"
        );
        assert_eq!(
            image_tag("gcr.io", &resolve("master", Some("eval")).unwrap()),
            "gcr.io/acme-prod/foo:abc1234"
        );
    }
}
