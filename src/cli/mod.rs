use crate::core::config::DEFAULT_CONFIG_FILE;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "vaultpack")]
#[command(about = "Index a markdown vault into a single linked artifact")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the index, reusing unchanged entries from the previous build
    Build(BuildArgs),

    /// Inspect the built index
    Show(ShowArgs),

    /// List the documents linking to a path
    Links(LinksArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Ignore the previous index and rebuild every entry
    #[arg(short, long)]
    pub full: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Vault-relative path of the entry to print
    pub path: Option<String>,
}

#[derive(Args)]
pub struct LinksArgs {
    /// Vault-relative path of the target document
    pub path: String,
}
