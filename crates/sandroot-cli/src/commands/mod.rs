//! CLI command definitions and dispatch.

pub mod deploy;
pub mod pack;
pub mod rm;
pub mod run;
pub mod umount;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sandroot_common::config::SandrootConfig;
use sandroot_common::constants::{BIN_NAME, CONFIG_ENV};

/// Deploy and run chroot sandboxes from root filesystem images.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch an image and install it as a live root.
    Deploy(deploy::DeployArgs),
    /// Run a command chrooted into a root.
    Run(run::RunArgs),
    /// Unmount everything under a root without removing it.
    Umount(umount::UmountArgs),
    /// Unmount and remove a root.
    Rm(rm::RmArgs),
    /// Gzip an uncompressed tar stream into an image file.
    Pack(pack::PackArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Deploy(args) => deploy::execute(args, config),
        Command::Run(args) => run::execute(args, config),
        Command::Umount(args) => umount::execute(&args, config),
        Command::Rm(args) => rm::execute(&args, config),
        Command::Pack(args) => pack::execute(&args),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<SandrootConfig> {
    let Some(path) = path else {
        return Ok(SandrootConfig::default());
    };
    let config = SandrootConfig::load(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    tracing::debug!(config = %serde_json::to_string(&config)?, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_trailing_command() {
        let cli = Cli::parse_from([
            "sroot", "run", "--root", "/srv/app", "--bind", "/data:/data", "--keep-cap",
            "NET_BIND_SERVICE", "--", "/bin/sh", "-c", "echo hi",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.command, vec!["/bin/sh", "-c", "echo hi"]);
                assert_eq!(args.bind, vec!["/data:/data"]);
                assert_eq!(args.keep_cap, vec!["NET_BIND_SERVICE"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["sroot", "rm", "--root", "/srv/app", "--log-format", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_config(Some(std::path::Path::new("/nonexistent/sandroot.json"))).is_err());
        assert_eq!(load_config(None).expect("default"), SandrootConfig::default());
    }
}
