//! Common test utilities and helpers for github-clone-all tests
use assert_fs::prelude::*;
use assert_fs::TempDir;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;

/// Git program that cannot exist, so any attempted git call fails fast
pub const MISSING_GIT: &str = "/nonexistent/bin/git-for-tests";

/// Scratch directory holding a config file and the tools' output
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Write a config that points every tool at `api_url` with retries off
    pub fn write_config(&self, api_url: &str) -> PathBuf {
        let config = self.temp_dir.child("config.yml");
        config
            .write_str(&format!(
                r#"
github:
  api_url: "{}"
http:
  timeout: 10
  retries: 0
git:
  program: "{}"
  retries: 0
logging:
  level: debug
"#,
                api_url, MISSING_GIT
            ))
            .expect("Failed to write test config");
        config.path().to_path_buf()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    /// Pretend `name` was cloned by an earlier run
    pub fn create_existing_clone(&self, directory: &str, name: &str) {
        self.temp_dir
            .child(directory)
            .child(name)
            .child(".git")
            .create_dir_all()
            .expect("Failed to create .git directory");
    }
}

/// Mock GitHub repository data for testing
#[derive(Debug, Clone)]
pub struct MockRepository {
    pub name: String,
    pub owner: String,
    pub default_branch: String,
    pub is_private: bool,
}

impl MockRepository {
    pub fn new(name: &str, owner: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            default_branch: "main".to_string(),
            is_private: false,
        }
    }

    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub fn as_private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// The repository as a listing endpoint returns it
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "full_name": format!("{}/{}", self.owner, self.name),
            "html_url": format!("https://github.com/{}/{}", self.owner, self.name),
            "default_branch": self.default_branch,
            "private": self.is_private,
        })
    }
}

pub fn listing(repositories: &[MockRepository]) -> Value {
    Value::Array(repositories.iter().map(MockRepository::to_json).collect())
}

/// Run one of the crate's binaries to completion
pub async fn run_binary(program: &str, args: &[&str]) -> Output {
    Command::new(program)
        .args(args)
        .env_remove("RUST_LOG")
        .kill_on_drop(true)
        .output()
        .await
        .expect("Failed to execute binary")
}

/// stdout and stderr together, for assertions that do not care which stream
pub fn combined_output(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}

pub fn assert_contains_any(text: &str, expected: &[&str]) {
    let found = expected.iter().any(|item| text.contains(item));
    assert!(
        found,
        "Expected text to contain at least one of {:?}, but it didn't. Text: {}",
        expected,
        text
    );
}
