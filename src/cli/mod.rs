//! Command-line interface for dbshell
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Selection of the connection profile a run works against
//! - `version` and `config` subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, ConnectionProfile, LogLevel};
use crate::error::{ConfigError, ConnectionError, Result};
use crate::pool::BackendKind;

/// Profile id used for a connection given entirely on the command line
pub const AD_HOC_CONNECTION: &str = "cli";

/// dbshell - one shell for MySQL, Redis and MongoDB
#[derive(Parser, Debug)]
#[command(
    name = "dbshell",
    version,
    about = "Multi-dialect database shell",
    long_about = "Run SQL, Redis and MongoDB shell commands against configured connections,
either one command at a time with --eval or in an interactive loop."
)]
pub struct CliArgs {
    /// Connection profile id from the config file
    #[arg(short = 'd', long = "connection", value_name = "ID")]
    pub connection: Option<String>,

    /// Backend of an ad-hoc connection (mysql, redis, mongodb)
    #[arg(short = 'b', long, value_name = "KIND")]
    pub backend: Option<String>,

    /// Host of an ad-hoc connection
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port of an ad-hoc connection
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database of an ad-hoc connection
    #[arg(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Username for authentication
    #[arg(short = 'u', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password for authentication
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Session id; defaults to a fresh one per run
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Run one command and exit
    #[arg(short = 'e', long, value_name = "COMMAND")]
    pub eval: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Quiet mode (minimal output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for dbshell
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration with CLI overrides applied
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    ///
    /// # Returns
    /// * `Result<Self>` - Interface or a configuration error
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, &args)?;
        config.validate()?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// The profile this run works against
    ///
    /// Priority:
    /// 1. `--connection <id>`
    /// 2. The ad-hoc profile built from `--host` / `--backend`
    /// 3. The first profile in the config file
    pub fn selected_profile(&self) -> Result<&ConnectionProfile> {
        let id = match &self.args.connection {
            Some(id) => id.as_str(),
            None if self.config.profile(AD_HOC_CONNECTION).is_some() => AD_HOC_CONNECTION,
            None => {
                return self
                    .config
                    .connections
                    .first()
                    .ok_or_else(|| ConfigError::MissingField("connections".to_string()).into());
            }
        };
        self.config
            .profile(id)
            .ok_or_else(|| ConnectionError::UnknownConnection(id.to_string()).into())
    }

    /// Session id for this run
    pub fn session_id(&self) -> String {
        self.args
            .session
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_logging_args(config, args);
        if let Some(timeout) = args.timeout {
            config.pool.connect_timeout = timeout;
        }
        Self::apply_connection_args(config, args)
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Register the ad-hoc profile when `--host` or `--backend` is given
    fn apply_connection_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        if args.host.is_none() && args.backend.is_none() {
            return Ok(());
        }

        let backend = match &args.backend {
            Some(kind) => kind.parse::<BackendKind>().map_err(|_| ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: kind.clone(),
            })?,
            None => BackendKind::Document,
        };

        config.connections.retain(|p| p.id != AD_HOC_CONNECTION);
        config.connections.push(ConnectionProfile {
            id: AD_HOC_CONNECTION.to_string(),
            backend,
            host: args.host.clone().unwrap_or_else(|| "localhost".to_string()),
            port: args.port,
            username: args.username.clone(),
            password: args.password.clone(),
            database: args.database.clone(),
        });
        Ok(())
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                println!("dbshell version {}", env!("CARGO_PKG_VERSION"));
                println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                if *validate {
                    // Loading already validated; reaching here means it passed.
                    println!("Configuration is valid: {}", self.config_path().display());
                }
                if *show {
                    self.show_config()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Print the effective configuration with passwords masked
    fn show_config(&self) -> Result<()> {
        let mut shown = self.config.clone();
        for profile in &mut shown.connections {
            if profile.password.is_some() {
                profile.password = Some("***".to_string());
            }
        }
        let text =
            toml::to_string_pretty(&shown).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("{text}");
        Ok(())
    }

    /// Configuration file path (from args or default)
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Print the connection banner
    pub fn print_banner(&self, profile: &ConnectionProfile) {
        if !self.args.quiet {
            println!(
                "Connecting to: {}://{}:{}",
                profile.backend,
                profile.host,
                profile.port_or_default()
            );
            println!("Using dbshell: {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("dbshell").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_eval_and_connection() {
        let args = parse(&["-d", "shop", "-e", "SELECT 1", "--session", "tab-1"]);
        assert_eq!(args.connection.as_deref(), Some("shop"));
        assert_eq!(args.eval.as_deref(), Some("SELECT 1"));
        assert_eq!(args.session.as_deref(), Some("tab-1"));
    }

    #[test]
    fn test_ad_hoc_profile() {
        let args = parse(&["--backend", "redis", "--host", "cache", "--database", "2"]);
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args).unwrap();

        let profile = config.profile(AD_HOC_CONNECTION).unwrap();
        assert_eq!(profile.backend, BackendKind::KeyValue);
        assert_eq!(profile.host, "cache");
        assert_eq!(profile.port_or_default(), 6379);
        assert_eq!(profile.database.as_deref(), Some("2"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let args = parse(&["--backend", "oracle"]);
        let mut config = Config::default();
        assert!(CliInterface::apply_args_to_config(&mut config, &args).is_err());
    }

    #[test]
    fn test_verbosity_overrides_config_level() {
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &parse(&["--vv"])).unwrap();
        assert_eq!(config.logging.level, LogLevel::Trace);

        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &parse(&["-q"])).unwrap();
        assert_eq!(config.logging.level, LogLevel::Error);
    }

    #[test]
    fn test_timeout_override() {
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &parse(&["--timeout", "3"])).unwrap();
        assert_eq!(config.pool.connect_timeout, 3);
    }
}
