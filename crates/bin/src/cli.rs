//! CLI argument definitions for the Canopy binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Canopy local-first data store
#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(about = "Canopy: path-addressable reactive data store")]
#[command(version)]
pub struct Cli {
    /// Store file backing the in-memory adapter
    #[arg(short, long, default_value = "canopy.json", env = "CANOPY_FILE")]
    pub file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a value at a path
    Put(PutArgs),
    /// Read the value at a path
    Get(GetArgs),
    /// List the direct children of a path
    Ls(LsArgs),
    /// Watch a path and print updates until interrupted
    Watch(WatchArgs),
}

#[derive(clap::Args, Debug)]
pub struct PutArgs {
    /// Slash-separated path, e.g. "users/ada/name"
    pub path: String,

    /// Value to store. Parsed as JSON; anything that is not valid JSON is
    /// stored as a string.
    pub value: String,

    /// Logical timestamp in milliseconds (defaults to the current time)
    #[arg(short, long)]
    pub timestamp: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Slash-separated path
    pub path: String,

    /// Levels of nested directories to aggregate into the output
    #[arg(short, long, default_value_t = 1)]
    pub recursion: u32,

    /// Also print the value's timestamp
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct LsArgs {
    /// Slash-separated path (defaults to the root)
    #[arg(default_value = "")]
    pub path: String,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Slash-separated path
    pub path: String,

    /// Levels of nested directories to aggregate into printed values
    #[arg(short, long, default_value_t = 1)]
    pub recursion: u32,
}
