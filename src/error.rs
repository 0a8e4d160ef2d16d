use std::io;
use std::path::{Path, PathBuf};

/// Typed failure kinds for the orchestration workflow.
///
/// Workflow plumbing uses `anyhow` for context chaining, but every failure
/// the orchestrator can produce bottoms out in one of these variants so the
/// entry point can map each kind to a distinct exit code.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(
        "iElm module path was not found. Ensure iElm is installed (globally or locally, no matter) or provide a custom path with `--path`"
    )]
    ModuleNotFound,

    #[error("{op} {}: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("load manifest {}: {detail}", .path.display())]
    ManifestLoad { path: PathBuf, detail: String },

    #[error("`{command}` {detail}{}", format_stderr_tail(.stderr_tail))]
    ProcessExit {
        command: String,
        detail: String,
        stderr_tail: Vec<String>,
    },

    #[error("no test specified")]
    UnsupportedCommand,
}

impl WorkflowError {
    pub fn filesystem(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn manifest_load(path: &Path, detail: impl ToString) -> Self {
        Self::ManifestLoad {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }

    /// Process exit codes for the entry point. 1 is reserved for untyped
    /// failures and clap keeps 2 for usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ModuleNotFound => 10,
            Self::Filesystem { .. } => 11,
            Self::ManifestLoad { .. } => 12,
            Self::ProcessExit { .. } => 13,
            Self::UnsupportedCommand => 14,
        }
    }
}

fn format_stderr_tail(tail: &[String]) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("; stderr: {}", tail.join(" | "))
    }
}
