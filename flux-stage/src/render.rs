//! Turns a chart, an instance values file and a commit hash into a single manifest document.

use std::path::Path;

use serde::Deserialize;

use crate::{docker, Result};

pub struct RenderArgs<'a> {
    pub release_name: &'a str,
    pub chart_dir: &'a Path,
    pub values_file: &'a Path,
    pub image_tag: &'a str,
}

pub trait Renderer {
    /// Returns the rendered manifest.
    fn render(&self, args: RenderArgs) -> Result<String>;
}

/// Runs `helm template` in a container.
pub struct HelmRenderer<'a> {
    pub version: &'a str,
}

const CHART_MOUNT: &str = "/chart";
const VALUES_MOUNT: &str = "/values.yml";

impl Renderer for HelmRenderer<'_> {
    fn render(&self, args: RenderArgs) -> Result<String> {
        let chart_dir = docker::mount_path(args.chart_dir)?;
        let values_file = docker::mount_path(args.values_file)?;
        let image = format!("alpine/helm:{}", self.version);
        // `--set-string` keeps hash-like tags such as `1234567` or `1e10` from being read as numbers.
        let image_tag = format!("image.tag={}", args.image_tag);

        let stdout = docker::capture(docker::run(
            &image,
            &[
                docker::Mount {
                    host: &chart_dir,
                    container: CHART_MOUNT,
                },
                docker::Mount {
                    host: &values_file,
                    container: VALUES_MOUNT,
                },
            ],
            [
                "template",
                args.release_name,
                CHART_MOUNT,
                "--set-string",
                image_tag.as_str(),
                "-f",
                VALUES_MOUNT,
            ],
        ))?;

        Ok(String::from_utf8(stdout)?)
    }
}

/// The resource kinds of a rendered manifest, in document order.
#[derive(Debug, PartialEq, Eq)]
pub struct ManifestSummary {
    pub kinds: Vec<String>,
}

/// Parses a multi-document manifest. Empty documents, which templates produce for disabled
/// resources, are skipped. A manifest without any resource is an error.
pub fn summarize(manifest: &str) -> Result<ManifestSummary> {
    let mut kinds = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .ok_or("rendered manifest contains a document without a `kind`")?;
        kinds.push(kind.to_owned());
    }

    if kinds.is_empty() {
        return Err("rendered manifest does not contain any resources".into());
    }

    Ok(ManifestSummary { kinds })
}
