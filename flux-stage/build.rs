use std::{env, fs, io::BufRead, path::PathBuf, process::Command};

fn git<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Option<std::process::Output> {
    let output = Command::new("git").args(args).output().ok()?;
    output.status.success().then_some(output)
}

fn git_commit_hash() -> Option<String> {
    let output = git(["rev-parse", "--short", "HEAD"])?;
    let mut lines = output.stdout.lines();
    let commit_hash = lines.next()?.ok()?;
    assert!(lines.next().is_none());
    Some(commit_hash)
}

fn git_is_clean() -> bool {
    git(["status", "--porcelain"])
        .map(|output| output.stdout.is_empty())
        .unwrap_or(true)
}

fn main() {
    let doing_release = option_env!("FLUX_STAGE_RELEASE")
        .map(|env| matches!(env, "1" | "true"))
        .unwrap_or_default();

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if !doing_release {
        // Building from a source archive leaves us without a commit to point at.
        if let Some(commit_hash) = git_commit_hash() {
            version.push('+');
            version.push_str(&commit_hash);
            if !git_is_clean() {
                version.push_str(".dirty");
            }
        }
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::write(
        out_dir.join("version.rs"),
        format!("pub const VERSION: &str = {version:?};"),
    )
    .unwrap();
}
