//! `sroot rm`: Unmount and remove a root.

use std::path::PathBuf;

use clap::Args;
use sandroot_common::config::SandrootConfig;
use sandroot_runtime::orchestrator::Orchestrator;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Root directory, or a symlink to it. A symlink is removed on its own,
    /// leaving the directory it points to.
    #[arg(long)]
    pub root: PathBuf,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if unmounting or removal fails.
pub fn execute(args: &RmArgs, config: SandrootConfig) -> anyhow::Result<()> {
    let handle = Orchestrator::new(config).teardown(&args.root)?;
    crate::output::status("Removed", &handle.path().display().to_string());
    Ok(())
}
