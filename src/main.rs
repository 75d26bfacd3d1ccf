use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use theme_builder::config::Config;
use theme_builder::errors::{ConfigError, PhaseError};
use theme_builder::logging::init_logging;
use theme_builder::session::validate_ownership_table;
use theme_builder::ui::Console;

mod cmd;

#[derive(Parser)]
#[command(name = "theme-builder")]
#[command(version, about = "Human-in-the-loop Shopify theme builder")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Accept every generated artifact without prompting
    #[arg(long, global = true)]
    pub yes: bool,

    /// Builder home (defaults to $THEME_BUILDER_HOME or the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start or resume a session (the default)
    Run {
        /// Resume this session id directly instead of showing the picker
        #[arg(long)]
        session: Option<String>,
    },
    /// List stored sessions, most recent first
    List,
    /// Move a session into sessions/archive
    Archive { id: String },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let root = cli.root.clone().unwrap_or_else(Config::root_from_env);

    let _guard = match init_logging(&Config::log_dir_for(&root), cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: file logging disabled: {e:#}");
            None
        }
    };

    if let Err(err) = run(cli, root).await {
        report(&err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, root: PathBuf) -> Result<()> {
    validate_ownership_table()?;
    match cli.command {
        None => cmd::cmd_run(root, cli.yes, None).await,
        Some(Commands::Run { session }) => cmd::cmd_run(root, cli.yes, session).await,
        Some(Commands::List) => cmd::cmd_list(&root),
        Some(Commands::Archive { id }) => cmd::cmd_archive(&root, &id),
    }
}

fn report(err: &anyhow::Error) {
    let console = Console::new();
    tracing::error!(error = %format!("{err:#}"), "theme-builder exited with an error");

    if let Some(ConfigError::MissingKeys { keys }) = err.downcast_ref::<ConfigError>() {
        console.error("Missing required environment variables:");
        console.list(keys);
        console.info("Set them in the environment or a .env file and run again.");
        return;
    }

    console.error(&format!("{err:#}"));
    if saved_before_exit(err) {
        console.info("Session saved. You can resume later.");
    }
}

/// Only a failed phase leaves a session saved at the point it stopped.
fn saved_before_exit(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<PhaseError>(), Some(PhaseError::Failed { .. }))
}
