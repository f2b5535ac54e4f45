//! `soxc`: drives the native back end from the command line. Parses a
//! `.soxb` bytecode container, runs it through `sox_frontend` →
//! `sox_codegen` → `sox_object`, and optionally resolves several compiled
//! inputs against each other via `sox_module`.

mod input;
mod options;
mod pipeline;

use clap::Parser;
use options::{Command, Options};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = Options::parse();
    let success = match &options.command {
        Command::Object(args) => pipeline::generate_object(args)?,
        Command::Executable(args) => pipeline::generate_executable(args)?,
        Command::Link(args) => pipeline::link(args)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
