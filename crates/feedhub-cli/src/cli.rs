//! CLI argument definitions for feedhub.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pull` | Pull one item from the Feed or the Hub |
//! | `bundle` | Pull a paginated collection |
//! | `push` | Push one item, immediately or through a deferred closure |
//!
//! # Examples
//!
//! ```bash
//! feedhub --config clinic-a.json pull --command getPatient --id p-1
//! feedhub --config clinic-a.json bundle --command visits --direction to-backend --max-items 200
//! feedhub --config clinic-a.json push --command putVisit --direction to-backend --item visit.json --atomic --retries 3
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Moves feed items between a Feed and the Hub.
#[derive(Debug, Parser)]
#[command(name = "feedhub", author, version, about = "Feed/Hub item exchange CLI")]
pub struct Cli {
    /// Feed configuration file (JSON).
    #[arg(long, global = true, default_value = "feedhub.json")]
    pub config: PathBuf,

    /// Log requests and item payloads with every failure.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull one item.
    Pull(PullArgs),
    /// Pull a paginated collection.
    Bundle(BundleArgs),
    /// Push one item.
    Push(PushArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HomeArg {
    Feed,
    Hub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    ToFeed,
    ToBackend,
}

/// Options shared by every operation command.
#[derive(Debug, Args)]
pub struct OperationArgs {
    /// Feed-side path or Hub command.
    #[arg(long)]
    pub command: String,

    #[arg(long, value_enum, default_value_t = DirectionArg::ToFeed)]
    pub direction: DirectionArg,

    /// Side the operation belongs to. Together with the direction it decides
    /// which peer is contacted.
    #[arg(long, value_enum, default_value_t = HomeArg::Feed)]
    pub home: HomeArg,

    /// Key of the item, also sent as the `id` parameter.
    #[arg(long)]
    pub id: Option<String>,

    /// Extra parameter as `key=value`; values that parse as JSON are sent as JSON.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct PullArgs {
    #[command(flatten)]
    pub operation: OperationArgs,
}

#[derive(Debug, Args)]
pub struct BundleArgs {
    #[command(flatten)]
    pub operation: OperationArgs,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Items to collect; negative means a single request.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_items: i64,

    /// Page size override.
    #[arg(long)]
    pub chunk_max_items: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PushArgs {
    #[command(flatten)]
    pub operation: OperationArgs,

    /// JSON file holding the item.
    #[arg(long)]
    pub item: PathBuf,

    /// Build a deferred push closure and drive it with a local retry loop.
    #[arg(long, default_value_t = false)]
    pub atomic: bool,

    /// Extra calls of the deferred closure after the first one.
    #[arg(long, default_value_t = 3, requires = "atomic")]
    pub retries: u32,
}
