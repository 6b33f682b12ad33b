//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::{InsertionPosition, PaginatorMode, PaginatorType};

/// Structural metadata engine: logical and physical structure of digitized objects
#[derive(Parser, Debug)]
#[command(name = "structmeta")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Store directory (default: from config, ~/.structmeta)
    #[arg(short = 'S', long, global = true, value_hint = ValueHint::DirPath)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Node addresses are comma separated child indices from the root, e.g. `0,2`.
/// An empty address (`""`) is the root.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty workpiece
    New {
        /// Workpiece id
        id: String,
        /// Type of the logical root
        #[arg(short = 't', long = "type", default_value = "monograph")]
        kind: String,
    },

    /// Show logical and physical structure
    Show {
        /// Workpiece id
        id: String,
        /// Show only the physical tree
        #[arg(long, conflicts_with = "logical")]
        physical: bool,
        /// Show only the logical tree
        #[arg(long, conflicts_with = "physical")]
        logical: bool,
    },

    /// Insert a structure division
    Insert {
        /// Workpiece id
        id: String,
        /// Type of the new division
        kind: String,
        /// Address of the reference division
        #[arg(short, long, default_value = "")]
        at: String,
        /// Position relative to the reference
        #[arg(short, long, default_value = "last-child")]
        position: InsertionPosition,
        /// Pages (1-based, in page order) the new division views
        #[arg(long, value_delimiter = ',')]
        pages: Vec<usize>,
        /// Label of the new division
        #[arg(short, long)]
        label: Option<String>,
        /// Insert into the physical tree instead
        #[arg(long, conflicts_with_all = ["pages", "count"])]
        physical: bool,
        /// Insert this many divisions, counting a metadata value
        #[arg(short, long, requires = "metadata")]
        count: Option<usize>,
        /// Metadata key counted by --count
        #[arg(short, long, requires = "count")]
        metadata: Option<String>,
        /// First value of the counted metadata
        #[arg(long, default_value = "1")]
        first: String,
    },

    /// Append pages without media
    AddPage {
        /// Workpiece id
        id: String,
        /// Number of pages
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Remove a division and its subtree
    Remove {
        /// Workpiece id
        id: String,
        /// Address of the division
        at: String,
        /// Address the physical tree instead
        #[arg(long)]
        physical: bool,
    },

    /// Move a logical division
    Move {
        /// Workpiece id
        id: String,
        /// Address of the division to move
        from: String,
        /// Address of the target
        to: String,
        /// Position relative to the target
        #[arg(short, long, default_value = "after")]
        position: InsertionPosition,
    },

    /// Link a child workpiece into a parent
    Link {
        /// Parent workpiece id
        parent: String,
        /// Child workpiece id
        child: String,
        /// Insertion position, child indices ending with the new index
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Remove the link to a child workpiece
    Unlink {
        /// Parent workpiece id
        parent: String,
        /// Child workpiece id
        child: String,
    },

    /// Attach unreferenced media as pages and label all pages
    CreatePagination {
        /// Workpiece id
        id: String,
    },

    /// Relabel selected pages
    Paginate {
        /// Workpiece id
        id: String,
        /// Pages (1-based, in page order)
        #[arg(long, value_delimiter = ',', required = true)]
        pages: Vec<usize>,
        #[command(flatten)]
        labels: LabelArgs,
        /// Relabel only the selected pages instead of everything from the first one
        #[arg(long)]
        selected_only: bool,
    },

    /// Reset page orders to 1..n and relabel all pages
    Renumber {
        /// Workpiece id
        id: String,
        #[command(flatten)]
        labels: LabelArgs,
    },

    /// Split workpieces into a parent and one child per top-level division
    Explode {
        /// Workpiece ids
        #[arg(required = true)]
        ids: Vec<String>,
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

/// How page labels are produced.
#[derive(clap::Args, Debug, Clone)]
pub struct LabelArgs {
    /// Label type: arabic, roman, uncounted, freetext
    #[arg(short = 't', long = "type", default_value = "arabic")]
    pub kind: PaginatorType,
    /// Mode: pages, double-pages, foliation, recto-verso
    #[arg(short, long, default_value = "pages")]
    pub mode: PaginatorMode,
    /// First label
    #[arg(short, long, default_value = "1")]
    pub start: String,
    /// Wrap labels in brackets
    #[arg(short, long)]
    pub fictitious: bool,
    /// Separator for double pages (default: from config)
    #[arg(long)]
    pub separator: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
