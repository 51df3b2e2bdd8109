use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Push commands to and pull changes from a Tally sync server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the sync API
    #[arg(
        long,
        global = true,
        env = "TALLY_API_URL",
        default_value = "http://127.0.0.1:8080",
        value_name = "URL"
    )]
    pub api_url: String,

    /// Bearer token used for authenticated routes
    #[arg(
        long,
        global = true,
        env = "TALLY_ACCESS_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub access_token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a business record
    #[command(alias = "new")]
    Add {
        /// Record name
        name: String,
        /// Client temp id echoed back in `temp_id_mapping`
        #[arg(long, value_name = "ID")]
        temp_id: Option<String>,
        /// Icon key
        #[arg(long)]
        icon: Option<String>,
        /// Display color
        #[arg(long)]
        color: Option<String>,
        /// Currency code
        #[arg(long)]
        currency: Option<String>,
    },
    /// Update attributes of a business record
    Update {
        /// Record id
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New icon key
        #[arg(long)]
        icon: Option<String>,
        /// New display color
        #[arg(long)]
        color: Option<String>,
        /// New currency code
        #[arg(long)]
        currency: Option<String>,
        /// New sort position
        #[arg(long)]
        order: Option<i64>,
        /// Archive or unarchive
        #[arg(long)]
        archived: Option<bool>,
        /// Mark or unmark as favorite
        #[arg(long)]
        favorite: Option<bool>,
    },
    /// Soft-delete a business record
    Delete {
        /// Record id
        id: String,
    },
    /// Push a JSON array of commands (stdin when no file is given)
    Push {
        /// Path to a JSON file holding the command array
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Pull changes since a sync token, or a full snapshot with `*`
    Pull {
        /// Sync token to pull from
        #[arg(short, long, default_value = "*")]
        token: String,
        /// Restrict the pull to these resource types
        #[arg(long = "resource-type", value_name = "TYPE")]
        resource_types: Vec<String>,
    },
    /// Join this device to the account and receive a full snapshot
    FirstSync {
        /// Which side's data wins
        #[arg(long, value_enum, default_value_t = FirstSyncMode::KeepServer)]
        mode: FirstSyncMode,
        /// Optional JSON file with the device's pending commands
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Check that the server is up
    Health,
    /// Print a user's checkpoint chain from a local database file
    Checkpoints {
        /// Path to the server database
        #[arg(long, value_name = "PATH")]
        db_path: PathBuf,
        /// User id whose chain to show
        #[arg(long, value_name = "ID")]
        user: String,
        /// Number of checkpoints to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FirstSyncMode {
    KeepDevice,
    KeepServer,
}
