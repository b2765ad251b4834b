use anyhow::Result;
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use github_clone_all::cli::exit_with_usage;
use github_clone_all::logging::init_logging;
use github_clone_all::{Config, GitHubClient};

#[derive(Parser, Debug)]
#[command(name = "github-list-repos")]
#[command(about = "Print the name of every public repository of a GitHub user, one per line.")]
#[command(version)]
struct Args {
    /// Whose repositories to list
    #[arg(long, value_name = "USER", value_parser = NonEmptyStringValueParser::new())]
    user: String,

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
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("Error listing repositories: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::resolve(args.config.as_deref())?;
    init_logging(args.verbose, &config.logging)?;

    // a failed listing is reported once, never retried
    let client = GitHubClient::new(&config, None)?.without_retries();
    let repositories = client.list_public_repositories(&args.user).await?;

    for repo in &repositories {
        println!("{}", repo.name);
    }

    Ok(())
}
