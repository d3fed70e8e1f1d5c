use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, collections, config, daemon, library, queue, status, sync, transfer};
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "mediashelf")]
#[command(about = "MediaShelf - Track what you watch, read and play, online or off")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a title to the library
    Add(library::AddArgs),

    /// Change fields of a library entry
    #[command(long_about = "Change one or more fields of a library entry. The change is saved locally right away and pushed to the remote store in the background, or queued when offline.")]
    Update(library::UpdateArgs),

    /// Remove a title from the library (its history is kept)
    Delete {
        /// Media id
        id: String,

        /// Do not ask for confirmation
        #[arg(long, short = 'y', action = ArgAction::SetTrue)]
        yes: bool,
    },

    /// List the library
    List(library::ListArgs),

    /// Show one entry with its history
    Show {
        /// Media id
        id: String,
    },

    /// Show recent history events
    History {
        /// Only events for this media id
        #[arg(long)]
        id: Option<String>,

        /// Maximum number of events
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Manage smart collections
    Collections {
        #[command(subcommand)]
        cmd: Option<CollectionCommands>,
    },

    /// Reconcile with the remote store once
    #[command(long_about = "Replay queued changes against the remote store, pull the remote library and merge it into the local one. Pending deletes are never resurrected and local-only items are always kept.")]
    Sync,

    /// Show connectivity, pending changes and last sync time
    Status,

    /// Inspect or act on the mutation queue
    Queue {
        #[command(subcommand)]
        cmd: Option<QueueCommands>,
    },

    /// Write the whole library to a JSON document
    Export {
        /// Output file (defaults to a timestamped file in the export directory)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Replace the local library with an exported JSON document
    Import {
        /// Document to import
        file: PathBuf,

        /// Do not ask for confirmation
        #[arg(long, short = 'y', action = ArgAction::SetTrue)]
        yes: bool,
    },

    /// Run in the foreground, reconciling periodically
    #[command(long_about = "Run MediaShelf as a long-lived process that probes remote reachability and reconciles on a fixed interval. Logs go to a daily rolling file in the log directory.")]
    Daemon {
        /// Seconds between reconciles (overrides sync.interval_seconds)
        #[arg(long, value_name = "SECONDS")]
        interval: Option<u64>,

        /// Skip the reconcile on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },

    /// Configure the remote store and sync options
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommands>,
    },

    /// Clear local data, dead letters or credentials
    #[command(long_about = "Clear local state. --data wipes the local library, history and queue (logout/reset), --dead-letters discards writes the remote refused, --credentials removes stored keys and tokens, --all does all three.")]
    Clear {
        /// Clear everything
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,

        /// Wipe the local library, history and mutation queue
        #[arg(long, action = ArgAction::SetTrue)]
        data: bool,

        /// Discard dead-lettered writes
        #[arg(long, action = ArgAction::SetTrue)]
        dead_letters: bool,

        /// Remove stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,

        /// Do not ask for confirmation
        #[arg(long, short = 'y', action = ArgAction::SetTrue)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CollectionCommands {
    /// List collections
    List,

    /// Create a collection
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// Media ids to include
        #[arg(long = "media", value_name = "ID")]
        media_ids: Vec<String>,
    },

    /// Rename a collection or change its members
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Replace the member list
        #[arg(long = "media", value_name = "ID")]
        media_ids: Option<Vec<String>>,
    },

    /// Delete a collection
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List writes waiting for the remote store
    Pending,

    /// List writes the remote store refused
    Dead,

    /// Put dead-lettered writes back in the queue
    Retry,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    Show {
        /// Show full configuration including masked secrets
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },

    /// Configure the remote store endpoint
    #[command(long_about = "Configure the Supabase/PostgREST endpoint the library is mirrored into. The API key is stored in the credentials file, never in config.toml.")]
    Remote {
        /// Project URL, e.g. https://xyz.supabase.co
        #[arg(long)]
        url: Option<String>,

        /// Enable or disable the remote store
        #[arg(long)]
        enabled: Option<bool>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// API key (prompted when omitted and none is stored)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Store a user access token for the remote store
    Login {
        /// Access token (prompted when omitted)
        #[arg(long)]
        token: Option<String>,

        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Forget the stored access token
    Logout,

    /// Configure sync behaviour
    Sync {
        #[arg(long)]
        interval: Option<u64>,

        /// Permanent rejections before a write is dead-lettered
        #[arg(long)]
        max_rejections: Option<u32>,

        /// Remote history events pulled per reconcile
        #[arg(long)]
        history_limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let output = output::Output::new(cli.output, cli.quiet);

    // The daemon logs to a file; everything else logs to stderr
    if !matches!(cli.command, Commands::Daemon { .. }) {
        logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
    }

    match cli.command {
        Commands::Add(args) => library::run_add(args, &output).await,
        Commands::Update(args) => library::run_update(args, &output).await,
        Commands::Delete { id, yes } => library::run_delete(&id, yes, &output).await,
        Commands::List(args) => library::run_list(args, &output).await,
        Commands::Show { id } => library::run_show(&id, &output).await,
        Commands::History { id, limit } => library::run_history(id.as_deref(), limit, &output).await,
        Commands::Collections { cmd } => collections::run_collections(cmd.unwrap_or(CollectionCommands::List), &output).await,
        Commands::Sync => sync::run_sync(&output).await,
        Commands::Status => status::run_status(&output).await,
        Commands::Queue { cmd } => queue::run_queue(cmd.unwrap_or(QueueCommands::Pending), &output).await,
        Commands::Export { file } => transfer::run_export(file, &output).await,
        Commands::Import { file, yes } => transfer::run_import(&file, yes, &output).await,
        Commands::Daemon { interval, no_startup_sync } => {
            daemon::run_daemon(interval, no_startup_sync, cli.verbose, &output).await
        }
        Commands::Config { cmd } => {
            let cmd = cmd.unwrap_or(ConfigCommands::Show { full: false });
            config::run_config(cmd, &output).await
        }
        Commands::Clear {
            all,
            data,
            dead_letters,
            credentials,
            yes,
        } => clear::run_clear(all, data, dead_letters, credentials, yes, &output).await,
    }
}
