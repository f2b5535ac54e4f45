//! `soxc` command-line surface: target selection, the three top-level
//! operations (`generate_object`, `generate_executable`, `link`), plus the
//! debug/optimisation flags the back end accepts but (per its contract)
//! treats as reserved.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "soxc", about = "Sox native back end: bytecode to object file, and back end linking")]
pub struct Options {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a `.soxb` bytecode file into a bare relocatable object.
    Object(EmitArgs),
    /// Compile into an object whose entry is additionally aliased to `main`.
    Executable(EmitArgs),
    /// Resolve symbols across several compiled inputs without writing a file.
    Link(LinkArgs),
}

#[derive(Args)]
pub struct EmitArgs {
    /// `.soxb` bytecode container (see `sox_cli::input`).
    pub input: PathBuf,

    #[arg(short, long)]
    pub output: PathBuf,

    /// One of `x86_64`, `arm64`, `aarch64`.
    #[arg(long, default_value = "x86_64")]
    pub target: String,

    /// One of `linux`, `macos`, `darwin`; selects ELF64 vs Mach-O 64.
    #[arg(long, default_value = "linux")]
    pub os: String,

    #[arg(long)]
    pub debug_output: bool,

    /// Reserved; currently ignored by every code-generation stage.
    #[arg(long, default_value_t = 0)]
    pub opt_level: u8,
}

#[derive(Args)]
pub struct LinkArgs {
    /// `.soxb` bytecode containers, one per object view to resolve together.
    pub inputs: Vec<PathBuf>,

    #[arg(long, default_value = "x86_64")]
    pub target: String,

    #[arg(long, default_value = "linux")]
    pub os: String,
}
