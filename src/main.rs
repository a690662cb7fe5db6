//! tripsync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tripsync::cli::commands::{self, Context};
use tripsync::cli::{Cli, Commands, OutputFormat};
use tripsync::config::{default_actor, Overrides};
use tripsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR --format json OR non-TTY stdout
    let json = cli.json
        || cli.format == OutputFormat::Json
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    // Commands that need no configuration
    match &cli.command {
        Commands::Version => return commands::version::execute(json),
        Commands::Completions { shell } => return commands::completions::execute(shell),
        _ => {}
    }

    let overrides = Overrides {
        remote_url: cli.remote_url.clone(),
        user_id: cli.user.clone(),
        offline: cli.offline,
    };
    let actor = cli.actor.clone().unwrap_or_else(default_actor);
    let ctx = Context::load(cli.db.as_deref(), actor, &overrides)?;

    match &cli.command {
        Commands::Status => commands::status::execute(&ctx, json),
        Commands::Trip { command } => commands::trip::execute(command, &ctx, json),
        Commands::Open { trip } => commands::open::execute(&ctx, trip, json),
        Commands::Sync { command } => commands::sync::execute(command, &ctx, json),
        Commands::Export { trips, output } => {
            commands::export::execute(&ctx, trips, output, json)
        }
        Commands::Import { file, no_push } => {
            commands::import::execute(&ctx, file, *no_push, json)
        }
        Commands::Access { trip } => commands::access::execute(&ctx, trip, json),
        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
