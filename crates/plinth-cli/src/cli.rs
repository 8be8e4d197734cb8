use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "plinth",
    about = "Plinth: declare methods once, publish them over CLI and HTTP",
    version,
    after_help = "Shell completion: plinth --complete <shell> [cursor] <tokens...>"
)]
pub struct Cli {
    /// Use the per-user registry under ~/.plinth instead of the project one
    #[arg(long, global = true)]
    pub global: bool,

    /// Registry file to read and write
    #[arg(long, global = true, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Log at debug level to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print every result as JSON, scalars included
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an application from a source unit
    Add {
        /// Application name; the first token of its CLI calls and its URL prefix
        name: String,

        /// Source unit manifest, optionally suffixed with `:TypeName`
        target: String,

        /// Keep the application off the CLI channel
        #[arg(long)]
        no_cli: bool,

        /// Keep the application off the network channel
        #[arg(long)]
        no_network: bool,

        /// Constructor arguments: positional values, then `--key value` pairs
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Unload an application and delete its spec
    Remove {
        /// Application name
        name: String,
    },

    /// List registered applications
    List,

    /// Show one application's spec and status
    Getapp {
        /// Application name
        name: String,
    },

    /// Write every application spec to a snapshot file
    Savestate {
        /// Snapshot path (defaults to the configured state file)
        path: Option<PathBuf>,
    },

    /// Add and load every application from a snapshot file
    Loadstate {
        /// Snapshot path (defaults to the configured state file)
        path: Option<PathBuf>,

        /// Skip applications whose source unit no longer exists
        #[arg(long)]
        skip_missing: bool,
    },

    /// Serve every network-enabled application over HTTP
    Serve {
        /// Listen address (defaults to the configured bind address)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Print the description document without instantiating anything
    Describe {
        /// Describe only this application
        #[arg(long)]
        app: Option<String>,
    },

    /// Call an application: `<app> [handler...] <method> [args...]`
    #[command(external_subcommand)]
    App(Vec<String>),
}
