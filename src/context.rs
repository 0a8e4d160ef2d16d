//! Working-directory resolution for a workflow run.
//!
//! The process working directory is never changed. Every filesystem and
//! child-process call takes a path from the resolved `WorkingContext`, so
//! there is nothing to restore when a workflow ends, successfully or not.
use crate::cli::InvocationConfig;
use crate::error::WorkflowError;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// npm package name of the iElm module this tool orchestrates.
pub const MODULE_NAME: &str = "ielm";

/// Resolved directories for one workflow run. Immutable once built.
#[derive(Debug, Clone)]
pub struct WorkingContext {
    /// Directory the tool was invoked from; the user manifest lives here and
    /// it is appended to the merged manifest's source directories.
    pub original_dir: PathBuf,
    /// Module directory all staging and child processes operate in.
    pub work_dir: PathBuf,
    /// Whether `work_dir` came from auto-discovery.
    pub discovered: bool,
}

impl WorkingContext {
    /// Resolve the working directory: explicit path wins, then `--local`
    /// keeps the invocation directory, then npm module auto-discovery.
    /// A failed discovery is fatal with a remediation message.
    pub fn resolve(config: &InvocationConfig) -> Result<Self> {
        let original_dir = env::current_dir().context("read current directory")?;

        if let Some(path) = &config.explicit_path {
            println!(":: iElm module path: {}", path.display());
            return Ok(Self {
                original_dir,
                work_dir: path.clone(),
                discovered: false,
            });
        }

        if config.run_locally {
            return Ok(Self {
                work_dir: original_dir.clone(),
                original_dir,
                discovered: false,
            });
        }

        let work_dir = discover_module_dir(&original_dir).ok_or(WorkflowError::ModuleNotFound)?;
        println!(":: iElm module path: {}", work_dir.display());
        let ctx = Self {
            original_dir,
            work_dir,
            discovered: true,
        };
        tracing::debug!(
            work_dir = %ctx.work_dir.display(),
            discovered = ctx.discovered,
            "resolved working context"
        );
        Ok(ctx)
    }
}

/// Search the npm module path space for the installed `ielm` package:
/// `node_modules/ielm` in `start` and each ancestor, then every `NODE_PATH`
/// entry, then the conventional global roots. First existing directory wins.
pub fn discover_module_dir(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join("node_modules").join(MODULE_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    if let Some(node_path) = env::var_os("NODE_PATH") {
        for dir in env::split_paths(&node_path) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let candidate = dir.join(MODULE_NAME);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
    }

    for root in global_module_roots() {
        let candidate = root.join(MODULE_NAME);
        tracing::debug!(candidate = %candidate.display(), "global discovery candidate");
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    None
}

fn global_module_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join(".npm-global").join("lib").join("node_modules"));
    }
    roots.push(PathBuf::from("/usr/local/lib/node_modules"));
    roots.push(PathBuf::from("/usr/lib/node_modules"));
    roots
}
