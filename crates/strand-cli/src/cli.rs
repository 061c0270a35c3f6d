use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use strand_repo::{Cid, Collection, Tid};

#[derive(Parser)]
#[command(
    name = "strand",
    about = "Strand: signed, content-addressed personal repositories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory
    #[arg(short = 'C', long, global = true, default_value = ".strand")]
    pub repo: PathBuf,

    /// Config file (defaults to strand.toml inside the repository)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new repository with a fresh signing key
    Init(InitArgs),
    /// Add a record to a collection
    Add(AddArgs),
    /// Replace the record behind an entry
    Edit(EditArgs),
    /// Delete an entry
    Rm(RmArgs),
    /// List entries, newest first
    Ls(LsArgs),
    /// Show the commit chain
    Log(LogArgs),
    /// Write an archive of the repository
    Export(ExportArgs),
    /// Apply an archive exported from this repository
    Import(ImportArgs),
    /// Describe the repository, or an archive file
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Identity to record instead of the key's own
    #[arg(long)]
    pub did: Option<String>,
}

#[derive(Args)]
pub struct AddArgs {
    pub namespace: String,
    pub text: String,
    #[arg(short, long, default_value = "posts")]
    pub collection: Collection,
}

#[derive(Args)]
pub struct EditArgs {
    pub namespace: String,
    pub tid: Tid,
    pub text: String,
    #[arg(short, long, default_value = "posts")]
    pub collection: Collection,
}

#[derive(Args)]
pub struct RmArgs {
    pub namespace: String,
    pub tid: Tid,
    #[arg(short, long, default_value = "posts")]
    pub collection: Collection,
}

#[derive(Args)]
pub struct LsArgs {
    pub namespace: Option<String>,
    #[arg(short, long, default_value = "posts")]
    pub collection: Collection,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    /// Only entries older than this TID
    #[arg(long)]
    pub from: Option<Tid>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ExportArgs {
    pub output: PathBuf,
    /// Only commits after this one
    #[arg(long, conflicts_with = "snapshot")]
    pub since: Option<Cid>,
    /// Head state only, without history
    #[arg(long)]
    pub snapshot: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    pub input: PathBuf,
    /// Verify signatures and block coverage of every new commit
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Archive to describe instead of the repository
    pub input: Option<PathBuf>,
}
