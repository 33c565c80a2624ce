// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

mod buffer;
mod chunker;
mod cmd;
mod ddl;
mod dialect;
mod dumper;
mod error;
mod manifest;
mod model;
mod progress;
mod queue;
mod ratelimit;
mod session;
mod sink;
mod worker;

use clap::Parser;
use cmd::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cmd::run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
