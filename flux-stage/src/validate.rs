use std::path::Path;

use crate::{docker, Result};

/// The policy scan only runs for manifests containing this token.
pub const SECURITY_CONTEXT_MARKER: &str = "securityContext:";

/// Resource kinds without stable published schemas.
pub const DEFAULT_SKIP_KINDS: &str =
    "CustomResourceDefinition,ExternalSecret,ServiceMonitor,PrometheusRule,BackendConfig,ManagedCertificate";

/// Accepted policy violations: default namespace, digest pinned images, `imagePullPolicy: Always`
/// and secrets exposed as environment variables.
pub const DEFAULT_SKIP_CHECKS: &str = "CKV_K8S_21,CKV_K8S_43,CKV_K8S_15,CKV_K8S_35";

const MANIFESTS_MOUNT: &str = "/manifests";

/// Splits a comma separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Decides on the manifest content alone whether the policy scan applies.
pub fn needs_policy_scan(manifest: &str) -> bool {
    manifest.contains(SECURITY_CONTEXT_MARKER)
}

/// A check of a rendered manifest on disk. Failing checks return an error.
pub trait ManifestCheck {
    fn name(&self) -> &str;

    fn check(&self, manifest: &Path) -> Result<()>;
}

/// Mounts the directory of `manifest` and returns the mount source plus the in-container path.
fn mount_manifest(manifest: &Path) -> Result<(std::path::PathBuf, String)> {
    let manifest = docker::mount_path(manifest)?;
    let file_name = manifest
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("manifest path {manifest:?} has no valid file name"))?
        .to_owned();
    let dir = manifest
        .parent()
        .ok_or_else(|| format!("manifest path {manifest:?} has no parent directory"))?
        .to_owned();
    Ok((dir, format!("{MANIFESTS_MOUNT}/{file_name}")))
}

/// Schema validation with kubeval.
pub struct Kubeval<'a> {
    pub version: &'a str,
    pub skip_kinds: &'a [String],
}

impl Kubeval<'_> {
    fn args(&self, manifest: &str) -> Vec<String> {
        let mut args = vec![manifest.to_owned(), "--strict".to_owned()];
        if !self.skip_kinds.is_empty() {
            args.push("--skip-kinds".to_owned());
            args.push(self.skip_kinds.join(","));
        }
        args
    }
}

impl ManifestCheck for Kubeval<'_> {
    fn name(&self) -> &str {
        "schema validation"
    }

    fn check(&self, manifest: &Path) -> Result<()> {
        let (dir, manifest) = mount_manifest(manifest)?;
        let args = self.args(&manifest);
        docker::run(
            &format!("garethr/kubeval:{}", self.version),
            &[docker::Mount {
                host: &dir,
                container: MANIFESTS_MOUNT,
            }],
            args.iter().map(String::as_str),
        )
        .status()?;
        Ok(())
    }
}

/// Security policy scan with checkov.
pub struct Checkov<'a> {
    pub version: &'a str,
    pub skip_checks: &'a [String],
}

impl Checkov<'_> {
    fn args(&self, manifest: &str) -> Vec<String> {
        let mut args = vec!["--quiet".to_owned()];
        if !self.skip_checks.is_empty() {
            args.push("--skip-check".to_owned());
            args.push(self.skip_checks.join(","));
        }
        args.push("-f".to_owned());
        args.push(manifest.to_owned());
        args
    }
}

impl ManifestCheck for Checkov<'_> {
    fn name(&self) -> &str {
        "policy scan"
    }

    fn check(&self, manifest: &Path) -> Result<()> {
        let (dir, manifest) = mount_manifest(manifest)?;
        let args = self.args(&manifest);
        docker::run(
            &format!("bridgecrew/checkov:{}", self.version),
            &[docker::Mount {
                host: &dir,
                container: MANIFESTS_MOUNT,
            }],
            args.iter().map(String::as_str),
        )
        .status()?;
        Ok(())
    }
}
