use std::path::Path;

use log::info;

use crate::{git, Result};

pub struct FetchArgs<'a> {
    pub repository: &'a str,
    pub branch: &'a str,
    pub dest: &'a Path,
}

/// Produces a local checkout of a versioned chart definition.
pub trait ChartFetcher {
    fn fetch(&self, args: FetchArgs) -> Result<()>;
}

/// Fetches the chart with a depth 1 clone. A previous checkout at the destination is replaced.
pub struct GitChartFetcher;

impl ChartFetcher for GitChartFetcher {
    fn fetch(&self, args: FetchArgs) -> Result<()> {
        let FetchArgs {
            repository,
            branch,
            dest,
        } = args;

        if dest.exists() {
            info!("Removing previous chart checkout at {}...", dest.display());
            std::fs::remove_dir_all(dest)?;
        }

        git::clone_shallow(repository, branch, dest)
    }
}
