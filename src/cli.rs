use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "callsheet")]
#[command(about = "Film pre-production gateway: artifact store, role gating, SD1 proxy", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create the gateway database (seeds an admin when SEED_USER_ID is set).
    Init {
        /// Database path (falls back to CALLSHEET_DB, then callsheet.sqlite)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run the gateway server: SD1 proxy, billing webhook, health probe.
    Serve {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(short, long, default_value_t = 8787)]
        port: u16,
    },

    /// Parse a screenplay through the SD1 backend and store the analysis.
    Analyze {
        #[arg(long)]
        db: Option<PathBuf>,
        /// Screenplay file (sent as a multipart upload)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Inline screenplay text
        #[arg(long)]
        text: Option<String>,
        /// Backend validation level
        #[arg(long, default_value = "lenient")]
        validation_level: String,
    },

    /// Generate a downstream artifact: one-liner, characters, schedule, budget, storyboard.
    Generate {
        artifact: String,
        #[arg(long)]
        db: Option<PathBuf>,
        /// First shoot day (schedule only), YYYY-MM-DD
        #[arg(long)]
        start_date: Option<String>,
        /// JSON file with constraints (schedule/budget) or shot settings (storyboard)
        #[arg(long)]
        constraints: Option<PathBuf>,
    },

    /// Show stored artifacts: a one-line summary each, or one artifact in full.
    Show {
        artifact: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Dump the artifact as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear one artifact, or everything. Clearing the script cascades to all
    /// dependent artifacts.
    Clear {
        artifact: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Evaluate the step gate for a tab name.
    Gate {
        tab: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Evaluate the access gate for a user, the way a protected page would.
    Access {
        id: String,
        /// Allowed roles (empty = no role restriction)
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
        /// Required permissions (empty = no permission restriction)
        #[arg(long, value_delimiter = ',')]
        permissions: Vec<String>,
        /// Permission mode: any | all
        #[arg(long, default_value = "any")]
        mode: String,
        /// Also check access to a specific project id
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Create or update a user record.
    UserAdd {
        id: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Self-selected role (stored in user-editable metadata)
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Assign a role provider-side (writes role plus its permission list).
    UserRole {
        id: String,
        role: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Mint a session token for a user. The token is printed once.
    UserToken {
        id: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show a user's customer record (lookup runs against a 5s deadline).
    UserShow {
        id: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
