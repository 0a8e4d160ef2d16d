//! CLI argument parsing for the iElm run workflow.
//!
//! The CLI is intentionally thin: it selects one of the named workflows and
//! carries the handful of knobs that change where and how they run. All
//! sequencing lives in the workflow module.
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Root CLI entrypoint for the orchestrator.
///
/// The subcommand is optional on purpose: a bare `ielm` behaves like
/// `ielm run`, matching how the tool is normally invoked from a project
/// directory.
#[derive(Parser, Debug)]
#[command(
    name = "ielm",
    version,
    about = "Build/run workflow orchestrator for the iElm development server",
    after_help = "Examples:\n  ielm                       Stage output/ and start server + client\n  ielm clean-run             Remove output/ first, then run\n  ielm run-dev               Run with the live-reload development client\n  ielm build --local         Bundle the client from the current directory\n  ielm run --path /opt/ielm  Use an explicit module directory"
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Use the current directory instead of auto-discovering the installed
    /// iElm module
    #[arg(long, global = true)]
    pub local: bool,

    /// Explicit iElm module directory; takes precedence over auto-discovery
    /// and --local
    #[arg(long, global = true, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Timeout in seconds for finite steps (bundling, package install);
    /// never applied to the server or client processes
    #[arg(long, global = true, value_name = "SECS")]
    pub step_timeout: Option<u64>,
}

/// Named workflows. The individual steps live in the workflow module.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bundle the iElm client with webpack
    Build,
    /// Stage output/, install packages, start the server and static client
    Run,
    /// Remove output/ first, then run
    CleanRun,
    /// Run with the live-reload development client instead of the static one
    RunDev,
    /// Remove output/ first, then run with the development client
    CleanRunDev,
    /// Not implemented; always fails
    Test,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Run => "run",
            Self::CleanRun => "clean-run",
            Self::RunDev => "run-dev",
            Self::CleanRunDev => "clean-run-dev",
            Self::Test => "test",
        }
    }
}

/// Parsed invocation, immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    pub command: Command,
    pub run_locally: bool,
    pub explicit_path: Option<PathBuf>,
    pub step_timeout: Option<Duration>,
}

impl RootArgs {
    pub fn into_config(self) -> InvocationConfig {
        InvocationConfig {
            command: self.command.unwrap_or(Command::Run),
            run_locally: self.local,
            explicit_path: self.path,
            step_timeout: self.step_timeout.map(Duration::from_secs),
        }
    }
}
