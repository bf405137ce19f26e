use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "sharekeeper")]
#[command(about = "Mounts, watches and remounts SMB/CIFS network shares")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Login name for shares that need one
    #[arg(long, env = "SMB_USERNAME", global = true)]
    username: Option<String>,

    /// Password for the login name
    #[arg(long, env = "SMB_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a share
    Mount {
        /// Share as //host/share or smb://workgroup/host/share
        share: Option<String>,

        /// Mount every known share instead of a single one
        #[arg(short, long)]
        all: bool,

        /// Workgroup the host belongs to
        #[arg(short, long)]
        workgroup: Option<String>,

        /// Login to bind, required for homes shares
        #[arg(short, long)]
        login: Option<String>,
    },

    /// Unmount a share
    Unmount {
        /// Share as //host/share
        share: Option<String>,

        /// Unmount every share mounted by this user
        #[arg(short, long)]
        all: bool,

        /// Also detach inaccessible and foreign mounts
        #[arg(short, long)]
        force: bool,

        /// Workgroup the host belongs to
        #[arg(short, long)]
        workgroup: Option<String>,
    },

    /// Show mounted shares
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Watch the mount table and remount flagged shares
    Watch {
        /// Seconds between reconciliation passes
        #[arg(short, long, default_value_t = 15)]
        interval: u64,
    },

    /// Set the remount flag for a share
    Remount {
        /// Share as //host/share
        share: String,

        /// none, once or always
        flag: String,

        /// Workgroup the host belongs to
        #[arg(short, long)]
        workgroup: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    info!("Starting sharekeeper v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Mount {
            share,
            all,
            workgroup,
            login,
        } => {
            commands::mount::execute(share, all, workgroup, login, cli.username, cli.password)
                .await
        }
        Commands::Unmount {
            share,
            all,
            force,
            workgroup,
        } => {
            commands::unmount::execute(share, all, force, workgroup, cli.username, cli.password)
                .await
        }
        Commands::Status { json } => {
            commands::status::execute(json, cli.username, cli.password).await
        }
        Commands::Watch { interval } => {
            commands::watch::execute(interval, cli.username, cli.password).await
        }
        Commands::Remount {
            share,
            flag,
            workgroup,
        } => commands::remount::execute(share, flag, workgroup).await,
    }
}
