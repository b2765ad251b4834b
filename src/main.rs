use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::info;

use github_clone_all::cli::{self, Resolved};
use github_clone_all::logging::init_logging;
use github_clone_all::{
    CloneEngine, CloneOutcome, CloneSummary, Config, FetchError, GitCli, GitHubClient,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let resolved = cli::resolve_or_exit();

    match run(resolved).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(resolved: Resolved) -> Result<()> {
    let mut config = Config::resolve(resolved.config.as_deref())?;
    init_logging(resolved.verbose, &config.logging)?;
    info!("Starting github-clone-all v{}", env!("CARGO_PKG_VERSION"));

    if let Some(directory) = &resolved.directory {
        config.clone.base_directory = directory.to_string_lossy().into_owned();
    }
    let base_dir = config.base_directory();
    std::fs::create_dir_all(&base_dir)
        .with_context(|| format!("Failed to create clone directory: {}", base_dir.display()))?;

    let invocation = &resolved.invocation;
    let client = GitHubClient::new(&config, invocation.credentials())?;

    println!("Querying GitHub API...");
    info!("Listing repositories from {}", client.listing_url(invocation));
    let repositories = client.list_repositories(invocation).await?;

    let engine = CloneEngine::new(GitCli::new(&config.git), base_dir, &config.git);
    let summary = engine.clone_all(&repositories).await;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &CloneSummary) {
    println!("\n🎉 Clone Complete!");
    println!("   📊 Total repositories: {}", summary.total_repositories);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   ⏭️  Already present: {}", summary.already_present);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed > 0 {
        println!("\n🔍 Failed Repositories:");
        for report in summary.failures() {
            if let CloneOutcome::Failed { reason } = &report.outcome {
                println!("   ❌ {}: {}", report.name, reason);
            }
        }
    }
}

fn report_error(err: &anyhow::Error) {
    if let Some(FetchError::Enumeration { payload, .. }) = err.downcast_ref::<FetchError>() {
        println!("ERROR enumerating the repos (an incorrect GitHub username/password?).");
        println!("GitHub response: {}", payload);
    } else {
        eprintln!("Error: {:?}", err);
    }
}
