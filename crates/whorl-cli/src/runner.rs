//! Command dispatch.
//!
//! Loads configuration, opens the inventory and routes each subcommand to
//! its implementation.

use crate::cli::{Cli, Commands};
use crate::commands::{self, Session};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use whorl_core::cli::{ExitCode, OutputFormat};
use whorl_core::{Error, WhorlConfig};
use whorl_inventory::LocalInventory;
use whorl_package::{PackageValidator, ScaffoldOptions};
use whorl_runtime::{ItemLoader, SecurityConfig};

/// Initializes logging to stderr.
///
/// `--verbose` forces debug level; otherwise `RUST_LOG` applies, defaulting
/// to `info`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to initialize logging")?;

    Ok(())
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Loads the configuration file and applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<WhorlConfig> {
    let config = WhorlConfig::load(path)?.apply_env(env_var);
    config.validate()?;
    Ok(config)
}

/// Output format from the `--format` flag, else from the configuration.
pub fn resolve_format(flag: Option<&str>, config: &WhorlConfig) -> Result<OutputFormat> {
    Ok(flag
        .unwrap_or(&config.general.default_format)
        .parse::<OutputFormat>()?)
}

/// Maps a failed command to its exit code.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<Error>() {
        Some(Error::ExecutionError { .. }) => ExitCode::EXECUTION_FAILED,
        Some(
            Error::InvalidArgument(_) | Error::ValidationError { .. } | Error::ConfigError { .. },
        ) => ExitCode::INVALID_INPUT,
        _ => ExitCode::ERROR,
    }
}

/// Executes a parsed command line.
pub fn execute_command(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    let format = resolve_format(cli.format.as_deref(), &config)?;
    let security = SecurityConfig::from_runtime_config(&config.runtime)?;
    let loader = ItemLoader::new(security);
    debug!(command = ?cli.command, %format, "executing command");

    match cli.command {
        Commands::Create {
            name,
            author,
            nice_name,
            item_version,
            description,
            categories,
            price,
            weight,
            consumable,
            dir,
        } => {
            let author = match author {
                Some(author) => author,
                None => config.resolve_owner(env_var)?.as_str().to_string(),
            };
            let mut options = ScaffoldOptions::new(name, author);
            options.nice_name = nice_name;
            options.version = item_version;
            options.description = description;
            options.categories = categories;
            options.price = price;
            options.weight = weight;
            options.consumable = consumable;
            commands::create::run(&options, &dir, format)
        }
        Commands::Package {
            source_dir,
            output,
            overwrite,
        } => commands::package::run(
            &source_dir,
            &output,
            overwrite,
            PackageValidator::with_loader(loader),
            format,
        ),
        Commands::Get { paths } => with_session(&config, loader, |session| {
            commands::get::run(session, &paths, format)
        }),
        Commands::Drop { names } => with_session(&config, loader, |session| {
            commands::drop::run(session, &names, format)
        }),
        Commands::Use { name, args } => with_session(&config, loader, |session| {
            commands::use_item::run(session, &name, &args, format)
        }),
        Commands::Info { name } => with_session(&config, loader, |session| {
            commands::info::run(session, &name, format)
        }),
        Commands::List => with_session(&config, loader, |session| {
            commands::list::run(session, format)
        }),
    }
}

/// Opens the configured inventory and runs `f` against it.
fn with_session<T>(
    config: &WhorlConfig,
    loader: ItemLoader,
    f: impl FnOnce(&Session<'_>) -> Result<T>,
) -> Result<T> {
    let owner = config.resolve_owner(env_var)?;
    let inventory = LocalInventory::new(config.inventory_dir()?)?;
    let working_dir = std::env::current_dir().context("failed to read the working directory")?;
    f(&Session::new(owner, &inventory, loader, working_dir))
}
