use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use log::error;

use crate::{process, redact::redact_bytes, temp_path, Result};

/// A read-only bind mount for `docker run`.
pub struct Mount<'a> {
    pub host: &'a Path,
    pub container: &'a str,
}

/// Prepares `docker run --rm` of `image` with the given mounts and arguments.
pub fn run<'a, I>(image: &str, mounts: &[Mount], args: I) -> process::Command
where
    I: IntoIterator<Item = &'a str>,
{
    let mut argv: Vec<OsString> = vec!["run".into(), "--rm".into()];
    for mount in mounts {
        argv.push("--volume".into());
        let mut volume = OsString::from(mount.host.as_os_str());
        volume.push(":");
        volume.push(mount.container);
        volume.push(":ro");
        argv.push(volume);
    }
    argv.push(image.into());
    argv.extend(args.into_iter().map(OsString::from));

    process::Command::new("docker").args(argv.iter().map(OsString::as_os_str))
}

/// Runs the command and returns its standard output. Standard error is only surfaced, redacted,
/// when the command fails.
pub fn capture(command: process::Command) -> Result<Vec<u8>> {
    let output = command.try_output()?;
    if !output.status.success() {
        for line in redact_bytes(&output.stderr).lines() {
            error!("{line}");
        }
    }
    Ok(output.require_success()?.output.stdout)
}

/// Resolves a host path for a bind mount. Docker requires absolute paths and the path has to exist.
pub fn mount_path(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path)
        .map_err(|error| format!("unable to resolve {path:?} for mounting: {error}").into())
}

/// Partial implementation of the JSON emitted by the `--metadata-file` option of `docker build`.
/// See https://docs.docker.com/reference/cli/docker/buildx/build/#metadata-file.
#[derive(serde::Deserialize)]
struct MetadataFile {
    #[serde(rename = "containerimage.digest")]
    containerimage_digest: String,
}

pub struct BuildArgs<'a> {
    pub context_dir: &'a Path,
    pub commit_hash: &'a str,
    pub image_tag: &'a str,
}

pub struct BuildOutput {
    pub image_digest: String,
}

pub fn build_and_push(args: BuildArgs) -> Result<BuildOutput> {
    let metadata_filepath = temp_path::tmp_json_path();

    process::command!(
        "docker",
        "buildx",
        "build",
        args.context_dir,
        "--metadata-file",
        metadata_filepath,
        "--tag",
        args.image_tag,
        "--build-arg",
        format!("COMMIT_HASH={}", args.commit_hash),
        "--annotation",
        // https://github.com/opencontainers/image-spec/blob/main/annotations.md
        format!(
            "org.opencontainers.image.revision={revision}",
            revision = args.commit_hash
        ),
        "--push",
    )
    .status()?;

    let metadata_string = std::fs::read_to_string(&metadata_filepath)?;

    let metadata: MetadataFile = serde_json::from_str(&metadata_string)?;

    Ok(BuildOutput {
        image_digest: metadata.containerimage_digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mounts_read_only() {
        let command = run(
            "garethr/kubeval:latest",
            &[Mount {
                host: Path::new("/work/.flux-stage"),
                container: "/manifests",
            }],
            ["/manifests/foo.yaml", "--strict"],
        );
        assert_eq!(
            format!("{command:?}"),
            r#""docker" "run" "--rm" "--volume" "/work/.flux-stage:/manifests:ro" "garethr/kubeval:latest" "/manifests/foo.yaml" "--strict""#
        );
    }

    #[test]
    fn metadata_file_digest_is_read() {
        let metadata: MetadataFile = serde_json::from_str(
            r#"{
                "buildx.build.ref": "builder/builder0/abc",
                "containerimage.descriptor": {"mediaType": "application/vnd.oci.image.index.v1+json"},
                "containerimage.digest": "sha256:7d1b2b2e",
                "image.name": "gcr.io/acme-dev/foo:abc1234"
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.containerimage_digest, "sha256:7d1b2b2e");
    }
}
