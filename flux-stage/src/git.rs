use std::{num::NonZeroI32, path::Path};

use log::{error, info};

use crate::{process, redact::redact_bytes, Result};

/// Identity used for commits made by the pipeline.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub email: String,
}

fn log_lines(bytes: &[u8], log: impl Fn(&str)) {
    redact_bytes(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .for_each(log);
}

/// Runs a git command, capturing its output and surfacing it only after redaction.
fn run(command: process::Command) -> Result<process::Output> {
    let output = command.try_output()?;

    if output.status.success() {
        log_lines(&output.stdout, |line| info!("git: {line}"));
        log_lines(&output.stderr, |line| info!("git: {line}"));
    } else {
        log_lines(&output.stdout, |line| error!("git: {line}"));
        log_lines(&output.stderr, |line| error!("git: {line}"));
    }

    Ok(output.require_success()?)
}

fn git(repo: &Path) -> process::Command {
    process::command!("git", "-C", repo)
}

/// Clones only the tip of `branch`.
pub fn clone_shallow(url: &str, branch: &str, dest: &Path) -> Result<()> {
    run(process::command!(
        "git", "clone", "--depth", "1", "--branch", branch, "--single-branch", url, dest,
    ))?;
    Ok(())
}

pub fn local_branch_exists(repo: &Path, branch: &str) -> Result<bool> {
    let output = process::args!(
        git(repo),
        "rev-parse",
        "--verify",
        "--quiet",
        format!("refs/heads/{branch}"),
    )
    .try_output()?;

    Ok(output.status.success())
}

/// Asks `origin` whether it has `branch`. `git ls-remote --exit-code` exits with 2 when no ref
/// matched.
pub fn remote_branch_exists(repo: &Path, branch: &str) -> Result<bool> {
    let output = process::args!(
        git(repo),
        "ls-remote",
        "--exit-code",
        "--heads",
        "origin",
        format!("refs/heads/{branch}"),
    )
    .try_output()?;

    match output.status.code() {
        Some(0) => Ok(true),
        Some(2) => Ok(false),
        code => {
            log_lines(&output.stderr, |line| error!("git: {line}"));
            Err(process::Error {
                command: output.command,
                kind: process::ErrorKind::NonZeroExitStatus(code.and_then(NonZeroI32::new)),
            }
            .into())
        }
    }
}

pub fn checkout_new_branch(repo: &Path, branch: &str) -> Result<()> {
    run(process::args!(git(repo), "checkout", "-b", branch))?;
    Ok(())
}

pub fn add(repo: &Path, path: &str) -> Result<()> {
    run(process::args!(git(repo), "add", "--", path))?;
    Ok(())
}

pub fn commit(repo: &Path, author: &Author, message: &str) -> Result<()> {
    run(process::args!(
        git(repo),
        "-c",
        format!("user.name={}", author.name),
        "-c",
        format!("user.email={}", author.email),
        "commit",
        "--message",
        message,
    ))?;
    Ok(())
}

pub fn push(repo: &Path, branch: &str) -> Result<()> {
    run(process::args!(
        git(repo),
        "push",
        "--set-upstream",
        "origin",
        branch
    ))?;
    Ok(())
}

/// Returns the commit hash of `HEAD`.
pub fn head_commit(repo: &Path) -> Result<String> {
    let output = process::args!(git(repo), "rev-parse", "HEAD").output()?;

    Ok(std::str::from_utf8(&output.stdout)?.trim().to_owned())
}
