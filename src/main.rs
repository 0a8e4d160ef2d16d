use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod context;
mod error;
mod manifest;
mod process;
mod staging;
mod workflow;

use cli::RootArgs;
use error::WorkflowError;
use workflow::Orchestrator;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = RootArgs::parse().into_config();
    let orchestrator = Orchestrator::new(config);
    if let Err(err) = orchestrator.dispatch() {
        // Uniform terminal handler: every workflow failure funnels here.
        eprintln!("xx Error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

/// Each typed failure kind gets its own exit code; untyped failures get 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<WorkflowError>()
        .map_or(1, WorkflowError::exit_code)
}
