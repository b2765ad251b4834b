//! Release asset downloader
//!
//! For every repository named in a list file, fetch its releases and write
//! each asset to `<output>/<repo>/<tag>/<asset>`. Nothing is cached: a rerun
//! downloads and overwrites everything again.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::github::{Asset, GitHubClient};
use crate::layout::asset_path;

/// Default name of the repository list file
pub const DEFAULT_LIST_FILE: &str = "list.txt";

/// Repository names from a newline-delimited list; blank lines are ignored
pub fn parse_repo_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

pub async fn read_repo_list(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read repository list: {}", path.display()))?;
    Ok(parse_repo_list(&contents))
}

/// Totals of a download run
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub repositories: usize,
    pub downloaded: usize,
    pub bytes: u64,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
    /// One line per failed repository or asset
    pub failures: Vec<String>,
}

impl DownloadSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record_failure(&mut self, what: String, err: &anyhow::Error) {
        error!("{}: {:?}", what, err);
        self.failed += 1;
        self.failures.push(format!("{}: {:#}", what, err));
    }
}

pub struct ReleaseDownloader {
    client: GitHubClient,
    owner: String,
    output_dir: PathBuf,
}

impl ReleaseDownloader {
    pub fn new(client: GitHubClient, owner: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            owner: owner.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Download the releases of every repository in order. A failing
    /// repository or asset is recorded and the run moves on.
    pub async fn download_all(&self, repositories: &[String]) -> DownloadSummary {
        let start_time = Instant::now();
        let mut summary = DownloadSummary::default();

        for repo in repositories {
            summary.repositories += 1;
            self.download_repo(repo, &mut summary).await;
        }

        summary.duration = start_time.elapsed();
        info!(
            "Downloaded {} assets ({} bytes) from {} repositories in {:.2}s, {} skipped, {} failed",
            summary.downloaded,
            summary.bytes,
            summary.repositories,
            summary.duration.as_secs_f64(),
            summary.skipped,
            summary.failed
        );
        summary
    }

    async fn download_repo(&self, repo: &str, summary: &mut DownloadSummary) {
        let releases = match self.client.list_releases(&self.owner, repo).await {
            Ok(releases) => releases,
            Err(err) => {
                println!("ERROR listing releases of {}.", repo);
                summary.record_failure(format!("releases of {}", repo), &anyhow::Error::from(err));
                return;
            }
        };
        debug!("{} has {} releases", repo, releases.len());

        for release in &releases {
            let Some(tag) = release.tag_name.as_deref() else {
                warn!("Skipping a release of {} without a tag", repo);
                summary.skipped += release.assets.len();
                continue;
            };

            for asset in &release.assets {
                self.download_asset(repo, tag, asset, summary).await;
            }
        }
    }

    async fn download_asset(&self, repo: &str, tag: &str, asset: &Asset, summary: &mut DownloadSummary) {
        let Some(url) = asset.browser_download_url.as_deref() else {
            warn!("Skipping {} of {} {}: no download URL", asset.name, repo, tag);
            summary.skipped += 1;
            return;
        };

        println!("Downloading {} from {}...", asset.name, repo);
        match self.fetch_to_disk(repo, tag, &asset.name, url).await {
            Ok(size) => {
                println!("Downloaded {} from {}", asset.name, repo);
                summary.downloaded += 1;
                summary.bytes += size;
            }
            Err(err) => {
                println!("ERROR downloading {} from {}.", asset.name, repo);
                summary.record_failure(format!("{}/{}/{}", repo, tag, asset.name), &err);
            }
        }
    }

    async fn fetch_to_disk(&self, repo: &str, tag: &str, name: &str, url: &str) -> Result<u64> {
        let target = asset_path(&self.output_dir, repo, tag, name)?;
        let bytes = self.client.download(url).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("Failed to write asset: {}", target.display()))?;

        debug!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(bytes.len() as u64)
    }
}
