mod commands;
mod output;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing::info;

use migrator_core::{Config, LoadOutcome};

use crate::output::Output;

#[derive(Parser)]
#[command(name = "zd-cw-migrator")]
#[command(about = "One-way Zendesk to ConnectWise PSA support-data migration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Verbose (debug-level) logging on the terminal
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration (the default when no command is given)
    Run,
    /// Test connectivity to both APIs
    Test,
    /// Ensure the Zendesk stamp fields exist and print their ids
    Fields,
    /// ConnectWise id discovery for filling in the config
    Setup {
        #[command(subcommand)]
        cmd: SetupCommands,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum SetupCommands {
    /// List service boards
    Boards,
    /// List statuses on a board
    Statuses {
        /// Board id (defaults to the configured destination board)
        #[arg(long)]
        board: Option<i64>,
    },
    /// List members
    Members,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the loaded configuration
    Show,
    /// Print the config file path in use
    Path,
}

const LOG_FILE_NAME: &str = "migration.log";

/// The rotating log lands directly in the work directory.
fn log_path() -> PathBuf {
    Config::work_dir().join(LOG_FILE_NAME)
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .break_words(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();
    let output = Output::new();

    // File logging goes to the work directory; the terminal stays quiet
    // because the run loop prints its own event stream.
    use tracing_appender::rolling;
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_dir = Config::work_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let terminal_filter = if cli.verbose {
        EnvFilter::new("migrator_core=debug,migrator_cli=debug,info")
    } else {
        EnvFilter::new("migrator_core=warn,migrator_cli=warn,warn")
    };
    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .boxed();

    let file_filter = EnvFilter::new("migrator_core=debug,migrator_cli=debug,info");
    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(terminal_filter))
        .with(file_layer.with_filter(file_filter))
        .init();

    info!(
        "Logging initialized. Logs are being written to: {:?}",
        log_path()
    );

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    if let Some(Commands::Config { cmd: ConfigCommands::Path }) = &cli.command {
        output.print(&config_path.display().to_string());
        return Ok(());
    }

    let mut config = match Config::load_or_scaffold(&config_path)? {
        LoadOutcome::Loaded(config) => *config,
        LoadOutcome::Scaffolded(path) => {
            output.warning(&format!(
                "No configuration found; wrote a template to {}",
                path.display()
            ));
            output.status("Fill in the credentials and ids, then run again.");
            return Ok(());
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            commands::config::complete_credentials(&mut config, &config_path, &output)?;
            run::run(config, &output).await
        }
        Commands::Test => {
            commands::config::complete_credentials(&mut config, &config_path, &output)?;
            commands::test::run(&config, &output).await
        }
        Commands::Fields => commands::setup::fields(&config, &output).await,
        Commands::Setup { cmd } => match cmd {
            SetupCommands::Boards => commands::setup::boards(&config, &output).await,
            SetupCommands::Statuses { board } => {
                commands::setup::statuses(&config, board, &output).await
            }
            SetupCommands::Members => commands::setup::members(&config, &output).await,
        },
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => commands::config::show(&config, &output),
            ConfigCommands::Path => unreachable!("handled before config load"),
        },
    }
}
