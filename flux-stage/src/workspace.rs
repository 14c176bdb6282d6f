use std::path::{Path, PathBuf};

use crate::context::DeploymentContext;

/// Local directory layout of a pipeline run. Artifacts are left in place after the run.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    values_dir: PathBuf,
    chart_path: PathBuf,
}

impl Workspace {
    /// `chart_path` is the location of the chart inside the chart repository checkout.
    pub fn new(
        root: impl Into<PathBuf>,
        values_dir: impl Into<PathBuf>,
        chart_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            values_dir: values_dir.into(),
            chart_path: chart_path.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chart_checkout_dir(&self) -> PathBuf {
        self.root.join("chart")
    }

    pub fn chart_dir(&self) -> PathBuf {
        self.chart_checkout_dir().join(&self.chart_path)
    }

    pub fn gitops_dir(&self) -> PathBuf {
        self.root.join("flux")
    }

    pub fn values_file(&self, context: &DeploymentContext) -> PathBuf {
        self.values_dir
            .join(format!("{}-values.yml", context.app_instance))
    }

    pub fn manifest_file(&self, context: &DeploymentContext) -> PathBuf {
        self.root.join(&context.manifest_file_name)
    }

    pub fn pull_request_file(&self, context: &DeploymentContext) -> PathBuf {
        self.root
            .join(format!("pull-request-{}.json", context.artifact_key()))
    }
}
