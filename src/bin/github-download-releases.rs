use anyhow::Result;
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use github_clone_all::cli::{exit_with_usage, Credentials};
use github_clone_all::logging::init_logging;
use github_clone_all::releases::{read_repo_list, DEFAULT_LIST_FILE};
use github_clone_all::{Config, DownloadSummary, GitHubClient, ReleaseDownloader};

#[derive(Parser, Debug)]
#[command(name = "github-download-releases")]
#[command(about = "Download every release asset of the repositories named in a list file.")]
#[command(version)]
struct Args {
    /// Owner of the listed repositories
    #[arg(long, value_name = "OWNER", value_parser = NonEmptyStringValueParser::new())]
    owner: String,

    /// Newline-delimited repository names
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LIST_FILE)]
    list: PathBuf,

    /// Directory that receives `<repo>/<tag>/<asset>`
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// User for GitHub authentication
    #[arg(long, value_name = "AUTH_USER")]
    auth_user: Option<String>,

    /// Password or command line token for GitHub authentication
    #[arg(long, value_name = "AUTH_PASSWORD")]
    auth_password: Option<String>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::try_parse().unwrap_or_else(|err| exit_with_usage::<Args>(err));

    match run(args).await {
        Ok(summary) if !summary.has_failures() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<DownloadSummary> {
    let config = Config::resolve(args.config.as_deref())?;
    init_logging(args.verbose, &config.logging)?;

    let repositories = read_repo_list(&args.list).await?;
    let credentials = Credentials::from_parts(args.auth_user.as_deref(), args.auth_password.as_deref());
    let client = GitHubClient::new(&config, credentials)?;

    let downloader = ReleaseDownloader::new(client, args.owner, args.output_dir);
    let summary = downloader.download_all(&repositories).await;

    println!("\n🎉 Download Complete!");
    println!("   📊 Repositories: {}", summary.repositories);
    println!("   📥 Assets downloaded: {} ({} bytes)", summary.downloaded, summary.bytes);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.has_failures() {
        println!("\n🔍 Failures:");
        for failure in &summary.failures {
            println!("   ❌ {}", failure);
        }
    }

    Ok(summary)
}
