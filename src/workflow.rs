//! Named workflows composed from context resolution, filesystem staging,
//! manifest merging, and process supervision.
//!
//! Each workflow is a strict sequence of steps; the first failure
//! short-circuits the rest. The server and client are the one exception:
//! they are supervised concurrently, and the first of them to fail cancels
//! the other.
use crate::cli::{Command, InvocationConfig};
use crate::context::WorkingContext;
use crate::error::WorkflowError;
use crate::manifest::{self, MANIFEST_FILE_NAME};
use crate::process::{self, CancelToken, Launch};
use crate::staging;
use anyhow::{Context, Result};
use std::path::PathBuf;

const OUTPUT_DIR_NAME: &str = "output";
const COMPONENTS_DIR: &str = "src/server/Component";
const COMPONENTS_DEST: &str = "Component";
const SERVER_SCRIPT: &str = "src/server/server.js";
const TEMPLATE_MANIFEST: &str = "src/server/elm-package.sample.json";
const BUILD_ARTIFACT: &str = "ielm.js";
const BUNDLER: &str = "webpack";
const PACKAGE_MANAGER: &str = "elm-package";
const NODE: &str = "node";
const SIMPLE_HTTP_SERVER_BIN: &str = "node_modules/.bin/node-simplehttpserver";
const WEBPACK_DEV_SERVER_BIN: &str = "node_modules/.bin/webpack-dev-server";
const SERVER_PORT: u16 = 3000;
const CLIENT_PORT: u16 = 8080;

/// Which client process accompanies the server.
#[derive(Debug, Clone, Copy)]
enum Client {
    Static,
    Dev,
}

/// One workflow run. Short-lived: built from the parsed invocation,
/// dispatched once, then dropped.
pub struct Orchestrator {
    config: InvocationConfig,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(config: InvocationConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Signal that stops the supervised children of this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn dispatch(&self) -> Result<()> {
        println!(":: {}", self.config.command.name());
        match self.config.command {
            Command::Build => self.build(),
            Command::Run => self.run(),
            Command::CleanRun => self.clean_run(),
            Command::RunDev => self.run_dev(),
            Command::CleanRunDev => self.clean_run_dev(),
            // Deliberate terminal no-op; fails before touching the
            // filesystem or resolving any directory.
            Command::Test => Err(WorkflowError::UnsupportedCommand.into()),
        }
    }

    fn build(&self) -> Result<()> {
        let ctx = WorkingContext::resolve(&self.config)?;
        self.bundle(&ctx)
    }

    fn run(&self) -> Result<()> {
        let ctx = WorkingContext::resolve(&self.config)?;
        if !ctx.work_dir.join(BUILD_ARTIFACT).is_file() {
            self.bundle(&ctx)?;
        }
        self.stage(&ctx)?;
        self.install(&ctx)?;
        self.serve(&ctx, Client::Static)
    }

    fn clean_run(&self) -> Result<()> {
        let ctx = WorkingContext::resolve(&self.config)?;
        self.clean(&ctx)?;
        self.stage(&ctx)?;
        self.install(&ctx)?;
        self.serve(&ctx, Client::Static)
    }

    fn run_dev(&self) -> Result<()> {
        let ctx = WorkingContext::resolve(&self.config)?;
        self.stage(&ctx)?;
        self.install(&ctx)?;
        self.serve(&ctx, Client::Dev)
    }

    fn clean_run_dev(&self) -> Result<()> {
        let ctx = WorkingContext::resolve(&self.config)?;
        self.clean(&ctx)?;
        self.stage(&ctx)?;
        self.install(&ctx)?;
        self.serve(&ctx, Client::Dev)
    }

    fn bundle(&self, ctx: &WorkingContext) -> Result<()> {
        let launch =
            Launch::new(BUNDLER, &[], &ctx.work_dir).with_timeout(self.config.step_timeout);
        process::run(&launch, &self.cancel).context("bundle the iElm client")?;
        Ok(())
    }

    fn clean(&self, ctx: &WorkingContext) -> Result<()> {
        let output_dir = output_dir(ctx);
        println!(":: clean '{}'.", output_dir.display());
        staging::clean_dir(&output_dir)?;
        Ok(())
    }

    fn stage(&self, ctx: &WorkingContext) -> Result<()> {
        let output_dir = output_dir(ctx);
        println!(":: create output directory.");
        staging::ensure_output_dir(&output_dir)?;
        println!(":: copy components.");
        staging::copy_tree(
            &ctx.work_dir.join(COMPONENTS_DIR),
            &output_dir.join(COMPONENTS_DEST),
        )?;
        println!(":: copy elm-package.json.");
        manifest::merge_and_write(
            &ctx.work_dir.join(TEMPLATE_MANIFEST),
            &ctx.original_dir,
            &output_dir.join(MANIFEST_FILE_NAME),
            &ctx.original_dir,
        )?;
        Ok(())
    }

    fn install(&self, ctx: &WorkingContext) -> Result<()> {
        println!(":: install Elm packages.");
        let launch = Launch::new(PACKAGE_MANAGER, &["install", "--yes"], &output_dir(ctx))
            .with_timeout(self.config.step_timeout);
        process::run(&launch, &self.cancel).context("install Elm packages")?;
        Ok(())
    }

    /// Start the server and the chosen client and supervise both until they
    /// exit. Listen success is not verified, only exit status.
    fn serve(&self, ctx: &WorkingContext, client: Client) -> Result<()> {
        println!(":: start server at http://localhost:{SERVER_PORT}.");
        let server = Launch::new(NODE, &[SERVER_SCRIPT], &ctx.work_dir);
        let client = match client {
            Client::Static => {
                println!(":: start client at http://localhost:{CLIENT_PORT}.");
                let port = CLIENT_PORT.to_string();
                Launch::new(
                    bin_path(ctx, SIMPLE_HTTP_SERVER_BIN),
                    &[".", &port],
                    &ctx.work_dir,
                )
            }
            Client::Dev => {
                println!(":: start development client at http://localhost:{CLIENT_PORT}.");
                Launch::new(bin_path(ctx, WEBPACK_DEV_SERVER_BIN), &[], &ctx.work_dir)
            }
        };
        process::run_all(&[server, client], &self.cancel).context("supervise server and client")?;
        Ok(())
    }
}

fn output_dir(ctx: &WorkingContext) -> PathBuf {
    ctx.work_dir.join(OUTPUT_DIR_NAME)
}

/// Absolute path into the module's npm bin directory. Relative program
/// paths combined with `current_dir` resolve differently across platforms,
/// so the launch always carries the full path.
fn bin_path(ctx: &WorkingContext, rel: &str) -> String {
    ctx.work_dir.join(rel).display().to_string()
}
