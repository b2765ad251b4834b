//! Command-line argument resolution for the clone tool
//!
//! Turns raw process arguments into an immutable [`InvocationConfig`]. Usage
//! errors never escape as `Result`s to the caller of [`resolve_or_exit`]: the
//! error and the full help text go to stderr and the process exits with
//! status 2.

use clap::builder::NonEmptyStringValueParser;
use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Exit status for bad, missing or conflicting arguments
pub const USAGE_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "github-clone-all")]
#[command(about = "Clone all public and private repositories from a GitHub user or organization.")]
#[command(version)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .multiple(false)
        .args(["clone_user", "clone_org"])
))]
pub struct CloneArgs {
    /// User for GitHub authentication
    #[arg(long, value_name = "AUTH_USER")]
    pub auth_user: Option<String>,

    /// Password or command line token for GitHub authentication
    #[arg(long, value_name = "AUTH_PASSWORD")]
    pub auth_password: Option<String>,

    /// Which user's repos to clone
    #[arg(long, value_name = "USER", value_parser = NonEmptyStringValueParser::new())]
    pub clone_user: Option<String>,

    /// Which organization's repos to clone
    #[arg(long, value_name = "ORG", value_parser = NonEmptyStringValueParser::new())]
    pub clone_org: Option<String>,

    /// Directory that receives the working copies (defaults to the configured base directory)
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Whose repositories are cloned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneTarget {
    User(String),
    Organization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    User,
    Organization,
}

/// HTTP Basic credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Credentials exist only when at least one part is non-empty
    pub fn from_parts(user: Option<&str>, password: Option<&str>) -> Option<Self> {
        let user = user.unwrap_or_default();
        let password = password.unwrap_or_default();

        if user.is_empty() && password.is_empty() {
            None
        } else {
            Some(Self {
                user: user.to_string(),
                password: password.to_string(),
            })
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated invocation of the clone tool; built once, never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationConfig {
    auth_user: Option<String>,
    auth_password: Option<String>,
    target: CloneTarget,
}

impl InvocationConfig {
    pub fn new(
        auth_user: Option<String>,
        auth_password: Option<String>,
        target: CloneTarget,
    ) -> Self {
        Self {
            auth_user,
            auth_password,
            target,
        }
    }

    pub fn auth_user(&self) -> Option<&str> {
        self.auth_user.as_deref()
    }

    pub fn target(&self) -> &CloneTarget {
        &self.target
    }

    pub fn target_kind(&self) -> TargetKind {
        match self.target {
            CloneTarget::User(_) => TargetKind::User,
            CloneTarget::Organization(_) => TargetKind::Organization,
        }
    }

    pub fn target_name(&self) -> &str {
        match &self.target {
            CloneTarget::User(name) | CloneTarget::Organization(name) => name,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.auth_user.as_deref(), self.auth_password.as_deref())
    }

    /// True when the authenticated identity is the user being cloned
    pub fn is_own_account(&self) -> bool {
        match (&self.target, &self.auth_user) {
            (CloneTarget::User(user), Some(auth_user)) => {
                auth_user.to_lowercase() == user.to_lowercase()
            }
            _ => false,
        }
    }
}

/// Everything the clone tool needs from its command line
#[derive(Debug, Clone)]
pub struct Resolved {
    pub invocation: InvocationConfig,
    pub directory: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Resolve arguments, returning clap's error instead of exiting
pub fn try_resolve<I, T>(args: I) -> Result<Resolved, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let CloneArgs {
        auth_user,
        auth_password,
        clone_user,
        clone_org,
        directory,
        config,
        verbose,
    } = CloneArgs::try_parse_from(args)?;

    let target = match (clone_user, clone_org) {
        (Some(user), None) => CloneTarget::User(user),
        (None, Some(org)) => CloneTarget::Organization(org),
        (Some(_), Some(_)) => {
            return Err(CloneArgs::command().error(
                ErrorKind::ArgumentConflict,
                "cannot set --clone-user and --clone-org at the same time",
            ))
        }
        (None, None) => {
            return Err(CloneArgs::command().error(
                ErrorKind::MissingRequiredArgument,
                "one of --clone-user or --clone-org is required",
            ))
        }
    };

    Ok(Resolved {
        invocation: InvocationConfig::new(auth_user, auth_password, target),
        directory,
        config,
        verbose,
    })
}

/// Resolve the process arguments or terminate with a usage message
pub fn resolve_or_exit() -> Resolved {
    match try_resolve(std::env::args_os()) {
        Ok(resolved) => resolved,
        Err(err) => exit_with_usage::<CloneArgs>(err),
    }
}

/// Report a clap error the way all tools in this crate do.
///
/// `--help` and `--version` print to stdout and exit 0; everything else prints
/// the error followed by the full help to stderr and exits with status 2.
pub fn exit_with_usage<C: CommandFactory>(err: clap::Error) -> ! {
    if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        err.exit();
    }

    let _ = err.print();
    eprintln!();
    eprintln!("{}", C::command().render_help());
    std::process::exit(USAGE_EXIT_CODE);
}
