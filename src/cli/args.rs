//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::config::DEFAULT_ACCOUNT;
use crate::domain::{TaxonId, Thresholds};

/// Partition Open Tree of Life subtrees into size-bounded clade records and sync them to ATProto
#[derive(Parser, Debug)]
#[command(name = "cladesync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file layered over the global one
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which subtree to fetch and how much of it.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// OTT id of the subtree root (e.g. 244265 for Mammalia)
    #[arg(short, long)]
    pub root: TaxonId,

    /// Depth limit asked from the tree service
    #[arg(long)]
    pub height_limit: Option<u32>,

    /// Drop nodes deeper than this while flattening (root = 0)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Skip common-name lookup
    #[arg(long)]
    pub no_enrich: bool,
}

/// Threshold overrides; unset values come from config.
#[derive(Args, Debug, Clone, Default)]
pub struct PartitionArgs {
    /// Soft clade size in nodes
    #[arg(long)]
    pub target: Option<usize>,

    /// Smallest subtree split into its own clade
    #[arg(long)]
    pub floor: Option<usize>,

    /// Clade size past which only leaves are inlined
    #[arg(long)]
    pub hard_max: Option<usize>,
}

impl PartitionArgs {
    pub fn apply(&self, base: Thresholds) -> Thresholds {
        Thresholds {
            target: self.target.unwrap_or(base.target),
            floor: self.floor.unwrap_or(base.floor),
            hard_max: self.hard_max.unwrap_or(base.hard_max),
        }
    }
}

/// Destination repository and write behaviour.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Account preset from [accounts.<name>]
    #[arg(short, long, default_value = DEFAULT_ACCOUNT)]
    pub account: String,

    /// Write one record per call instead of batching
    #[arg(long)]
    pub no_batch: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and partition a subtree without writing
    Plan {
        #[command(flatten)]
        fetch: FetchArgs,

        #[command(flatten)]
        partition: PartitionArgs,

        /// Show the clade hierarchy down to this depth
        #[arg(long)]
        tree: Option<usize>,

        /// Show the largest encoded records
        #[arg(long)]
        sizes: bool,

        /// Write the partition as JSON
        #[arg(long, value_hint = ValueHint::FilePath)]
        dump: Option<PathBuf>,
    },

    /// Fetch, partition and write a subtree
    Sync {
        #[command(flatten)]
        fetch: FetchArgs,

        #[command(flatten)]
        partition: PartitionArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Overwrite records that already exist
        #[arg(long)]
        replace: bool,
    },

    /// Add common names to an already synced tree and rewrite its records
    Enrich {
        /// OTT id of the synced tree's root
        #[arg(short, long)]
        root: TaxonId,

        #[command(flatten)]
        partition: PartitionArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Replace common names that are already set
        #[arg(long)]
        force: bool,

        /// Delete this tree's stored clades that the new partition no longer produces
        #[arg(long)]
        prune: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a config template
    Template,

    /// Show config paths
    Path,
}
