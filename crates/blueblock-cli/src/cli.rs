use std::path::PathBuf;

use blueblock_crypto::HashAlgorithm;
use blueblock_types::Principal;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blueblock",
    about = "BlueBlock anchor ledger: commit and verify batch Merkle roots",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger snapshot file; overrides `ledger_path` from the config
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Hash used for batch roots; overrides `hash_algorithm` from the config
    #[arg(long, global = true)]
    pub hash: Option<HashAlgorithm>,

    /// Principal issuing the call, as 64 hex characters
    #[arg(long = "as", global = true, value_parser = parse_principal)]
    pub caller: Option<Principal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute the Merkle root of a record batch
    Root(RootArgs),
    /// Generate a fresh random principal
    NewPrincipal,
    /// Create the ledger with the caller as owner
    Init(InitArgs),
    /// Register the caller's local state
    OptIn,
    /// Grant or revoke a principal's write approval (owner only)
    Approve(ApproveArgs),
    /// Commit an anchor record
    Submit(SubmitArgs),
    /// Show one anchor record
    Get(GetArgs),
    /// List anchor records
    List(ListArgs),
    /// Show the ledger's global state
    State(StateArgs),
    /// Check a record batch against a committed anchor
    Verify(VerifyArgs),
    /// Show or replace the ledger settings (owner only to replace)
    Settings(SettingsArgs),
    /// Drop the caller's local state and any approval it carried
    ClearState,
    /// Retire the ledger; records stay readable (owner only)
    Delete,
}

/// A record batch on disk.
#[derive(Args, Clone, Debug)]
pub struct BatchArgs {
    /// JSON array of records, or one record per line with `--lines`
    #[arg(long)]
    pub records: PathBuf,
    /// Treat each non-empty line of the records file as one record
    #[arg(long)]
    pub lines: bool,
}

#[derive(Args)]
pub struct RootArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
    /// Print every reduction level, leaves first
    #[arg(long)]
    pub levels: bool,
}

#[derive(Args)]
pub struct InitArgs {
    /// Accept submissions whose window start is after its end
    #[arg(long)]
    pub permissive: bool,
    /// Cap the ledger at the deployed 32/32 storage schema
    #[arg(long)]
    pub deployed_schema: bool,
}

#[derive(Args)]
pub struct ApproveArgs {
    #[arg(value_parser = parse_principal)]
    pub principal: Principal,
    #[arg(long)]
    pub revoke: bool,
}

#[derive(Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub project: String,
    /// Merkle root as 64 hex characters; requires --count, --from and --to
    #[arg(long, conflicts_with = "records")]
    pub root: Option<String>,
    #[arg(long, conflicts_with = "records")]
    pub count: Option<u64>,
    /// Compute root and count from this batch instead of passing them
    #[arg(long)]
    pub records: Option<PathBuf>,
    #[arg(long, requires = "records")]
    pub lines: bool,
    /// Window start (unix seconds); defaults to 24 hours before --to with --records
    #[arg(long)]
    pub from: Option<u64>,
    /// Window end (unix seconds); defaults to now with --records
    #[arg(long)]
    pub to: Option<u64>,
}

#[derive(Args)]
pub struct GetArgs {
    pub index: u64,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub project: Option<String>,
    /// Show only the most recent N records
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct StateArgs {
    /// Print the flat `anchor_<slot>_<field>` keyspace instead
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub index: u64,
    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args)]
pub struct SettingsArgs {
    #[arg(long)]
    pub enforce_window_order: Option<bool>,
    #[arg(long)]
    pub max_project_id_len: Option<usize>,
    #[arg(long, requires = "schema_byte_slices")]
    pub schema_uints: Option<u64>,
    #[arg(long, requires = "schema_uints")]
    pub schema_byte_slices: Option<u64>,
    /// Remove the storage quota
    #[arg(long, conflicts_with_all = ["schema_uints", "schema_byte_slices"])]
    pub no_schema: bool,
}

impl SettingsArgs {
    pub fn is_update(&self) -> bool {
        self.enforce_window_order.is_some()
            || self.max_project_id_len.is_some()
            || self.schema_uints.is_some()
            || self.no_schema
    }
}

fn parse_principal(s: &str) -> Result<Principal, String> {
    Principal::from_hex(s).map_err(|e| e.to_string())
}
