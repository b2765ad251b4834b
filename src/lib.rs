//! github-clone-all - mirror every repository of a GitHub user or organization
//!
//! Lists repositories through the GitHub REST API, following `Link` header
//! pagination, and clones each one with the local `git` tool. Repositories
//! that already have a working copy are skipped, so a rerun only picks up
//! what is missing. Two companion tools share the same plumbing: a public
//! repository lister and a release asset downloader.
//!
//! ## Modules
//!
//! - [`cli`]: Argument resolution for the clone tool
//! - [`config`]: YAML configuration with XDG defaults
//! - [`github`]: GitHub API client and paginated fetcher
//! - [`git`]: The `Vcs` trait and its `git` command-line implementation
//! - [`sync`]: Bulk clone-and-sync engine
//! - [`releases`]: Release asset downloader

pub mod cli;
pub mod config;
pub mod git;
pub mod github;
pub mod layout;
pub mod logging;
pub mod releases;
pub mod retry;
pub mod sync;

pub use cli::{CloneTarget, Credentials, InvocationConfig};
pub use config::Config;
pub use git::{GitCli, Vcs};
pub use github::{FetchError, GitHubClient, RepositoryRecord};
pub use releases::{DownloadSummary, ReleaseDownloader};
pub use sync::{CloneEngine, CloneOutcome, CloneSummary};
