use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use winewarden_core::trust::TrustTier;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "winewarden",
    version,
    about = "Calm protection for Windows games on Linux"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log decision paths to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    /// Run a recorded event log through the engine without launching anything
    Replay {
        #[arg(long)]
        event_log: PathBuf,
        #[arg(long)]
        prefix: PathBuf,
        /// Game id or path to the game executable
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        trust: Option<TrustTier>,
        #[arg(long)]
        pirate_safe: bool,
        #[arg(long)]
        audit_out: Option<PathBuf>,
        /// Replace an existing audit log at --audit-out
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Summarize a stored audit log and verify its hash chain
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        timeline: bool,
    },
    Trust {
        #[command(subcommand)]
        action: TrustCommand,
    },
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TrustCommand {
    Get { game: String },
    Set { game: String, tier: TrustTier },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Compile and validate the configured policy
    Check,
    /// Print rules in evaluation order
    Print,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { path, force } => init_config(path.or(cli.config), force),
        Commands::Replay {
            event_log,
            prefix,
            game,
            trust,
            pirate_safe,
            audit_out,
            force,
            json,
        } => commands::replay::execute(commands::replay::ReplayInputs {
            config_path: cli.config,
            event_log,
            prefix,
            game,
            trust_override: trust,
            pirate_safe,
            audit_out,
            force,
            json,
        }),
        Commands::Report {
            input,
            json,
            timeline,
        } => commands::report::execute(&input, json, timeline),
        Commands::Trust { action } => {
            let action = match action {
                TrustCommand::Get { game } => commands::trust::TrustAction::Get { game },
                TrustCommand::Set { game, tier } => commands::trust::TrustAction::Set { game, tier },
            };
            commands::trust::execute(cli.config, action)
        }
        Commands::Policy { action } => match action {
            PolicyCommand::Check => commands::policy::check(cli.config),
            PolicyCommand::Print => commands::policy::print(cli.config),
        },
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let paths = winewarden_core::config::ConfigPaths::resolve()?;
    let config_path = path.unwrap_or(paths.config_path);
    if config_path.exists() && !force {
        return Err(anyhow::anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let config = winewarden_core::config::Config::default_config();
    config.save(&config_path)?;
    println!("Config written to {}", config_path.display());
    Ok(())
}
