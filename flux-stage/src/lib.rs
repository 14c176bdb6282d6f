pub(crate) mod chart;
pub(crate) mod context;
pub(crate) mod docker;
pub(crate) mod git;
pub(crate) mod gitops;
pub(crate) mod name;
pub(crate) mod pipeline;
pub(crate) mod process;
pub(crate) mod pull_request;
pub(crate) mod redact;
pub(crate) mod render;
pub(crate) mod temp_path;
pub(crate) mod validate;
pub(crate) mod version;
pub(crate) mod workspace;

pub mod cli;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
