//! CLI surface: a `clap`-derived `Cli` wiring a single `dump` subcommand to
//! [`DumpOptions`], with a per-subcommand `#[derive(Parser)]`/
//! `#[derive(Subcommand)]` layout and `help_heading`-grouped flags.
//!
//! There is no live MySQL wire driver in scope (spec.md §1): `dump` runs
//! against a small bundled [`crate::session::FixtureSession`] demo dataset,
//! standing in for the schema a real shell would have already connected to
//! and enumerated.

mod dump;

use clap::{Parser, Subcommand};

const INPUT_OUTPUT: &str = "Input/Output";
const BEHAVIOR: &str = "Behavior";
const LIMITS: &str = "Limits";
const FILTERING: &str = "Filtering";

#[derive(Parser)]
#[command(name = "shelldump")]
#[command(author = "Helge Sverre <helge.sverre@gmail.com>")]
#[command(version)]
#[command(about = "Parallel logical dump engine: chunked, compressed table export for fast parallel reimport")]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dump the bundled demo schema to chunked, compressed files
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  shelldump dump -o out/
  shelldump dump -o out/ --threads 8 --dialect csv --compression zstd
  shelldump dump -o out/ --dry-run
  shelldump dump -o out/ --max-rate 1048576 --bytes-per-chunk 4096")]
    Dump(dump::DumpArgs),
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Dump(args) => dump::run(args),
    }
}
