use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use waypoint_core::checkpoint::{RecoveryKind, SnapshotType};
use waypoint_core::session::SessionRefs;

mod commands;

use commands::app::App;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Waypoint - session lifecycle and recovery point management", long_about = None)]
struct Cli {
    /// Caller identity; commands run anonymously without one
    #[arg(long, global = true, env = "WAYPOINT_USER")]
    user: Option<String>,

    /// Keep config and data under this directory
    #[arg(long, global = true, env = "WAYPOINT_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new session
    Start {
        #[command(flatten)]
        refs: RefArgs,
    },
    /// Pause an active session
    Pause { session_id: String },
    /// Resume a paused or expired session
    Resume { session_id: String },
    /// Complete a session and report its durations
    Complete { session_id: String },
    /// Replace the context of an active session
    Context {
        session_id: String,
        /// Context as JSON
        json: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Record a recovery point, optionally against a session
    SaveState {
        /// State as JSON
        json: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// auto, manual, error or system
        #[arg(long)]
        kind: Option<RecoveryKind>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[command(flatten)]
        refs: RefArgs,
    },
    /// Show one session, or list all of them
    Status {
        session_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List the stored recovery points of a session
    Points { session_id: String },
    /// Checkpoint the local window state
    Checkpoint {
        session_id: String,
        description: String,
        #[arg(long)]
        manual: bool,
    },
    /// List local recovery points, newest first
    Checkpoints {
        session_id: String,
        /// auto or manual
        #[arg(long = "type")]
        snapshot_type: Option<SnapshotType>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Restore the local window state from a recovery point
    Restore {
        session_id: String,
        recovery_point_id: String,
    },
    /// Drop local recovery points
    Clear {
        session_id: String,
        #[arg(long = "type")]
        snapshot_type: Option<SnapshotType>,
    },
    /// Show where config and data live
    Paths,
}

#[derive(clap::Args)]
struct RefArgs {
    #[arg(long)]
    workspace: Option<String>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long)]
    feature: Option<String>,
    #[arg(long)]
    work_item: Option<String>,
}

impl From<RefArgs> for SessionRefs {
    fn from(args: RefArgs) -> Self {
        SessionRefs {
            workspace: args.workspace,
            project: args.project,
            feature: args.feature,
            work_item: args.work_item,
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app = App::load(cli.home, cli.user)?;
    init_tracing(&app.config().logging.level);
    tracing::debug!(
        data_dir = %app.paths().data_dir().display(),
        user = ?app.ctx().user_id,
        "[Cli] Configuration loaded"
    );

    match cli.command {
        Commands::Start { refs } => commands::session::start(&app, refs.into()).await?,
        Commands::Pause { session_id } => commands::session::pause(&app, &session_id).await?,
        Commands::Resume { session_id } => commands::session::resume(&app, &session_id).await?,
        Commands::Complete { session_id } => {
            commands::session::complete(&app, &session_id).await?
        }
        Commands::Context {
            session_id,
            json,
            description,
        } => commands::session::context(&app, &session_id, &json, description).await?,
        Commands::SaveState {
            json,
            session,
            description,
            kind,
            tags,
            refs,
        } => {
            commands::session::save_state(
                &app,
                commands::session::SaveStateArgs {
                    json,
                    session,
                    description,
                    kind,
                    tags,
                    refs: refs.into(),
                },
            )
            .await?
        }
        Commands::Status { session_id, json } => {
            commands::session::status(&app, session_id.as_deref(), json).await?
        }
        Commands::Points { session_id } => commands::session::points(&app, &session_id).await?,
        Commands::Checkpoint {
            session_id,
            description,
            manual,
        } => commands::window::checkpoint(&app, &session_id, &description, manual)?,
        Commands::Checkpoints {
            session_id,
            snapshot_type,
            limit,
        } => commands::window::list(&app, &session_id, snapshot_type, limit)?,
        Commands::Restore {
            session_id,
            recovery_point_id,
        } => commands::window::restore(&app, &session_id, &recovery_point_id)?,
        Commands::Clear {
            session_id,
            snapshot_type,
        } => commands::window::clear(&app, &session_id, snapshot_type)?,
        Commands::Paths => commands::app::show_paths(&app),
    }

    Ok(())
}
