//! dbshell - multi-dialect database shell
//!
//! Runs SQL, Redis and MongoDB shell commands against a configured
//! connection, either once (`--eval`) or in an interactive loop.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode against a profile from ~/.dbshell/config.toml
//! dbshell -d shop
//!
//! # One command against an ad-hoc Redis connection
//! dbshell --backend redis --host localhost -e 'GET greeting'
//! ```

use dbshell::cli::CliInterface;
use dbshell::error::Result;
use dbshell::{CommandRequest, Executor, ReplEngine};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands, or run one command / the interactive loop
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let profile = cli.selected_profile()?.clone();
    let session_id = cli.session_id();
    let executor = Executor::from_config(cli.config());
    let sweepers = executor.spawn_sweepers();

    let result = match &cli.args().eval {
        Some(command) => {
            let request =
                CommandRequest::new(profile.backend, &profile.id, &session_id, command.as_str());
            executor
                .execute(&request)
                .await
                .map(|outcome| println!("{}", outcome.rendered_text))
        }
        None => {
            cli.print_banner(&profile);
            let mut repl = ReplEngine::new(
                profile.backend,
                &profile.id,
                &session_id,
                profile.database.clone(),
            );
            let result = repl.run(&executor).await;
            println!("Goodbye!");
            result
        }
    };

    executor.shutdown().await;
    for sweeper in sweepers {
        let _ = sweeper.await;
    }
    result
}

/// Initialize logging system based on the effective log level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity already folded into the config
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
