//! Clone engine - idempotent clone-and-sync of a repository batch
//!
//! Repositories are processed one after another. Each one ends as
//! [`CloneOutcome::AlreadyPresent`], [`CloneOutcome::ClonedAndSynced`] or
//! [`CloneOutcome::Failed`]; a failure is logged and never stops the batch.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::GitConfig;
use crate::git::{default_branch_from, Vcs};
use crate::github::RepositoryRecord;
use crate::layout::{is_already_cloned, repo_directory};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Result of processing one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    /// Working copy with `.git` metadata already existed; nothing was done
    AlreadyPresent,
    /// Cloned, default branch checked out, pulled and submodules updated
    ClonedAndSynced { branch: String },
    /// Some step failed; the batch moved on
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct CloneReport {
    pub name: String,
    pub url: String,
    pub outcome: CloneOutcome,
}

/// Results from a complete clone batch
#[derive(Debug, Clone)]
pub struct CloneSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub already_present: usize,
    pub failed: usize,
    pub duration: Duration,
    pub reports: Vec<CloneReport>,
}

impl CloneSummary {
    fn compile(reports: Vec<CloneReport>, duration: Duration) -> Self {
        let mut cloned = 0;
        let mut already_present = 0;
        let mut failed = 0;

        for report in &reports {
            match report.outcome {
                CloneOutcome::AlreadyPresent => already_present += 1,
                CloneOutcome::ClonedAndSynced { .. } => cloned += 1,
                CloneOutcome::Failed { .. } => failed += 1,
            }
        }

        Self {
            total_repositories: reports.len(),
            cloned,
            already_present,
            failed,
            duration,
            reports,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CloneReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, CloneOutcome::Failed { .. }))
    }
}

/// Clones every repository of a batch under one base directory
pub struct CloneEngine<V> {
    vcs: V,
    base_dir: PathBuf,
    retry: RetryPolicy,
    cleanup_on_error: bool,
}

impl<V: Vcs> CloneEngine<V> {
    pub fn new(vcs: V, base_dir: impl Into<PathBuf>, git: &GitConfig) -> Self {
        Self {
            vcs,
            base_dir: base_dir.into(),
            retry: git.retry_policy(),
            cleanup_on_error: git.cleanup_on_error,
        }
    }

    /// Process every repository in order and summarize the outcomes
    pub async fn clone_all(&self, repositories: &[RepositoryRecord]) -> CloneSummary {
        let start_time = Instant::now();

        println!();
        println!("Will clone the following repos:");
        for repo in repositories {
            println!("    * {}", repo.name);
        }

        let mut reports = Vec::with_capacity(repositories.len());
        for repo in repositories {
            let outcome = self.clone_repo(repo).await;
            reports.push(CloneReport {
                name: repo.name.clone(),
                url: repo.html_url.clone(),
                outcome,
            });
        }

        let summary = CloneSummary::compile(reports, start_time.elapsed());
        info!(
            "Clone batch completed in {:.2}s: {} cloned, {} already present, {} failed",
            summary.duration.as_secs_f64(),
            summary.cloned,
            summary.already_present,
            summary.failed
        );
        summary
    }

    /// Materialize one repository; errors are logged and reported, never propagated
    pub async fn clone_repo(&self, repo: &RepositoryRecord) -> CloneOutcome {
        println!();
        println!("-------- Cloning {} [{}] --------", repo.name, repo.html_url);

        let result = match repo_directory(&self.base_dir, &repo.name) {
            Ok(path) if is_already_cloned(&path) => {
                println!("SKIP: repo already cloned");
                return CloneOutcome::AlreadyPresent;
            }
            Ok(path) => self.clone_and_sync(repo, &path).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(branch) => CloneOutcome::ClonedAndSynced { branch },
            Err(err) => {
                println!();
                println!("ERROR while cloning {}.", repo.name);
                error!("Failed to clone {}: {:?}", repo.name, err);
                CloneOutcome::Failed {
                    reason: format!("{:#}", err),
                }
            }
        }
    }

    async fn clone_and_sync(&self, repo: &RepositoryRecord, path: &Path) -> Result<String> {
        self.clone_with_retry(&repo.html_url, path)
            .await
            .with_context(|| format!("Failed to clone {}", repo.html_url))?;

        let remote_head = self
            .vcs
            .remote_head(path)
            .await
            .context("Failed to query the remote default branch")?;
        let branch = default_branch_from(&remote_head);

        if let Some(hint) = &repo.default_branch_hint {
            if hint != &branch {
                debug!(
                    "Remote HEAD of {} is {} but the API reports {}",
                    repo.name, branch, hint
                );
            }
        }

        println!("Checking out default branch: {}", branch);
        self.vcs
            .checkout(path, &branch)
            .await
            .with_context(|| format!("Failed to check out {}", branch))?;

        let vcs = &self.vcs;
        retry_with_backoff(&self.retry, "git pull", |_| true, || vcs.pull_all(path))
            .await
            .context("Failed to pull remote updates")?;

        retry_with_backoff(&self.retry, "git submodule update", |_| true, || {
            vcs.update_submodules(path)
        })
        .await
        .context("Failed to update submodules")?;

        Ok(branch)
    }

    /// Clone, removing whatever a failed attempt left behind unless the
    /// directory existed before we started
    async fn clone_with_retry(&self, url: &str, path: &Path) -> Result<()> {
        let pre_existing = path.exists();
        let vcs = &self.vcs;
        let cleanup = self.cleanup_on_error && !pre_existing;

        retry_with_backoff(&self.retry, "git clone", |_| true, || async move {
            let result = vcs.clone_repository(url, path).await;
            if result.is_err() && cleanup && path.exists() {
                match tokio::fs::remove_dir_all(path).await {
                    Ok(()) => debug!("Removed partial clone at {}", path.display()),
                    Err(e) => warn!("Failed to remove partial clone {}: {}", path.display(), e),
                }
            }
            result
        })
        .await
    }
}
