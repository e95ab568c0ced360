//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use whorl_core::ItemName;

/// Whorl - package, collect and use sandboxed items.
#[derive(Parser, Debug)]
#[command(name = "whorl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (json, text, pretty); defaults to the configured format
    #[arg(long = "format", global = true)]
    pub format: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "WHORL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold a new item Source Tree.
    ///
    /// Writes `<dir>/<name>/<name>.wat` and `meta.toml`.
    Create {
        /// Item identifier (lowercase, digits and underscores)
        #[arg(value_parser = parse_item_name)]
        name: ItemName,

        /// Item author (defaults to the inventory owner)
        #[arg(long)]
        author: Option<String>,

        /// Human-readable name
        #[arg(long)]
        nice_name: Option<String>,

        /// Version string
        #[arg(long)]
        item_version: Option<String>,

        /// Item description
        #[arg(long)]
        description: Option<String>,

        /// Category label (repeatable)
        #[arg(long = "category", num_args = 1)]
        categories: Vec<String>,

        /// Price
        #[arg(long)]
        price: Option<f64>,

        /// Weight
        #[arg(long)]
        weight: Option<f64>,

        /// Whether the item is consumed on use
        #[arg(long)]
        consumable: Option<bool>,

        /// Parent directory of the new Source Tree
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Build a `<TypeName>.whorl` archive from a Source Tree.
    Package {
        /// Source Tree directory
        source_dir: PathBuf,

        /// Directory the archive is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Replace an existing archive
        #[arg(long)]
        overwrite: bool,
    },

    /// Acquire items into the inventory.
    ///
    /// Each path is a loose module (`.wat`, `.wasm`) or an archive
    /// (`.whorl`). Candidates are processed in order; a failure is reported
    /// and the batch continues.
    Get {
        /// Candidate files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove items from the inventory and write them to the working directory.
    ///
    /// Names are processed in order; a failure is reported and the batch
    /// continues.
    Drop {
        /// Item identifiers
        #[arg(required = true, value_parser = parse_item_name)]
        names: Vec<ItemName>,
    },

    /// Use an item.
    ///
    /// Arguments after the name are passed to the item as `--key value`
    /// flags.
    Use {
        /// Item identifier
        #[arg(value_parser = parse_item_name)]
        name: ItemName,

        /// Item arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Describe an item in the inventory.
    Info {
        /// Item identifier
        #[arg(value_parser = parse_item_name)]
        name: ItemName,
    },

    /// List the items in the inventory.
    List,
}

fn parse_item_name(value: &str) -> Result<ItemName, String> {
    ItemName::new(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_get_many() {
        let cli = Cli::parse_from(["whorl", "get", "lamp.wat", "Bell.whorl"]);
        match cli.command {
            Commands::Get { paths } => {
                assert_eq!(paths, vec![PathBuf::from("lamp.wat"), PathBuf::from("Bell.whorl")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parsing_get_requires_path() {
        assert!(Cli::try_parse_from(["whorl", "get"]).is_err());
    }

    #[test]
    fn test_cli_parsing_drop_many() {
        let cli = Cli::parse_from(["whorl", "drop", "lamp", "bell"]);
        match cli.command {
            Commands::Drop { names } => {
                let names: Vec<&str> = names.iter().map(ItemName::as_str).collect();
                assert_eq!(names, ["lamp", "bell"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["whorl", "drop"]).is_err());
        assert!(Cli::try_parse_from(["whorl", "drop", "lamp", "9lives"]).is_err());
    }

    #[test]
    fn test_cli_parsing_use_trailing_args() {
        let cli = Cli::parse_from(["whorl", "use", "lamp", "--wish", "gold", "--loud"]);
        match cli.command {
            Commands::Use { name, args } => {
                assert_eq!(name.as_str(), "lamp");
                assert_eq!(args, vec!["--wish", "gold", "--loud"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parsing_rejects_bad_name() {
        assert!(Cli::try_parse_from(["whorl", "info", "Lamp"]).is_err());
        assert!(Cli::try_parse_from(["whorl", "drop", "9lives"]).is_err());
    }

    #[test]
    fn test_cli_parsing_create_options() {
        let cli = Cli::parse_from([
            "whorl",
            "create",
            "magic_lamp",
            "--category",
            "light",
            "--category",
            "magic",
            "--price",
            "12.5",
            "--consumable",
            "false",
            "--item-version",
            "2.0.0",
        ]);
        match cli.command {
            Commands::Create {
                name,
                categories,
                price,
                consumable,
                item_version,
                dir,
                ..
            } => {
                assert_eq!(name.as_str(), "magic_lamp");
                assert_eq!(categories, vec!["light", "magic"]);
                assert_eq!(price, Some(12.5));
                assert_eq!(consumable, Some(false));
                assert_eq!(item_version.as_deref(), Some("2.0.0"));
                assert_eq!(dir, PathBuf::from("."));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["whorl", "list", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.format.as_deref(), Some("json"));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_cli_debug_assert() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
