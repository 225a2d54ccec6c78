//! CLI argument definitions for Pyrite.
//!
//! Uses `clap` derive macros to define the full command surface. Each
//! command corresponds to a handler in the [`super::commands`] module.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pyrite",
    version,
    about = "A dependency resolver and lockfile generator for Python projects",
    long_about = "Pyrite resolves the requirements declared in Pyrite.toml against one or \
                  more package indexes and pins the result in a reproducible Pyrite.lock."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve dependencies and write Pyrite.lock
    Lock {
        /// Consider pre-release versions for every package
        #[arg(long)]
        pre: bool,
        /// Ignore existing pins and resolve everything fresh
        #[arg(long)]
        refresh: bool,
    },

    /// Resolve and print the result without writing the lockfile
    Resolve {
        /// Consider pre-release versions for every package
        #[arg(long)]
        pre: bool,
    },

    /// Display the resolved dependency tree
    Tree {
        /// Maximum tree depth to display
        #[arg(short, long)]
        depth: Option<u32>,
        /// Show which packages depend on the given package
        #[arg(long)]
        why: Option<String>,
    },
}

/// Parse command-line arguments.
pub fn parse() -> Cli {
    Cli::parse()
}
