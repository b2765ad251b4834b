use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::config::GitConfig;

/// Branch checked out when the remote does not advertise a default branch
pub const FALLBACK_BRANCH: &str = "master";

/// Remote every clone is created with
const REMOTE: &str = "origin";

/// The version-control operations the clone workflow needs.
///
/// `GitCli` drives the real `git` binary; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Clone `url` into the new directory `dest`
    async fn clone_repository(&self, url: &str, dest: &Path) -> Result<()>;

    /// Raw output of the remote HEAD query, e.g. `origin/main`; may be empty
    async fn remote_head(&self, repo: &Path) -> Result<String>;

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<()>;

    /// Pull updates from every remote
    async fn pull_all(&self, repo: &Path) -> Result<()>;

    /// Initialize and update submodules recursively
    async fn update_submodules(&self, repo: &Path) -> Result<()>;
}

/// Turn the remote HEAD query output into a branch name.
///
/// `origin/main\n` becomes `main`; an empty answer falls back to `master`.
pub fn default_branch_from(remote_head: &str) -> String {
    let head = remote_head.trim();
    let branch = head
        .strip_prefix(REMOTE)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(head);

    if branch.is_empty() {
        FALLBACK_BRANCH.to_string()
    } else {
        branch.to_string()
    }
}

/// `Vcs` backed by the `git` command-line tool.
///
/// Arguments are passed as a vector, never through a shell.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
    interactive: bool,
}

impl GitCli {
    pub fn new(config: &GitConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout(),
            interactive: config.interactive,
        }
    }

    /// Run git with `args` (inside `dir` when given) and return its stdout
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        match dir {
            Some(dir) => info!("Running: {} (in {})", command_line, dir.display()),
            None => info!("Running: {}", command_line),
        }

        let mut command = AsyncCommand::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        if !self.interactive {
            command.env("GIT_TERMINAL_PROMPT", "0");
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                anyhow!(
                    "`{}` timed out after {}s",
                    command_line,
                    self.timeout.as_secs()
                )
            })?
            .with_context(|| format!("Failed to execute `{}`", command_line))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "`{}` failed ({}): {}",
                command_line,
                output.status,
                stderr.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("`{}` succeeded", command_line);
        Ok(stdout)
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest
            .to_str()
            .ok_or_else(|| anyhow!("Clone target is not valid UTF-8: {}", dest.display()))?;
        self.run(None, &["clone", url, dest]).await?;
        Ok(())
    }

    async fn remote_head(&self, repo: &Path) -> Result<String> {
        self.run(Some(repo), &["rev-parse", "--abbrev-ref", "origin/HEAD"])
            .await
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<()> {
        self.run(Some(repo), &["checkout", branch]).await?;
        Ok(())
    }

    async fn pull_all(&self, repo: &Path) -> Result<()> {
        self.run(Some(repo), &["pull", "--all"]).await?;
        Ok(())
    }

    async fn update_submodules(&self, repo: &Path) -> Result<()> {
        self.run(Some(repo), &["submodule", "update", "--init", "--recursive"])
            .await?;
        Ok(())
    }
}
