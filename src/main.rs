#![forbid(unsafe_code)]

//! gallery-sync — scan engine CLI entry point.

use clap::Parser;
use gallery_sync::cli::{Cli, run};

fn main() {
    let args = Cli::parse();
    if let Err(e) = run(&args) {
        eprintln!("gallery-sync: {e}");
        std::process::exit(1);
    }
}
