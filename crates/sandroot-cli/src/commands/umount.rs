//! `sroot umount`: Unmount everything under a root.

use std::path::PathBuf;

use clap::Args;
use sandroot_common::config::SandrootConfig;
use sandroot_runtime::orchestrator::Orchestrator;

/// Arguments for the `umount` command.
#[derive(Args, Debug)]
pub struct UmountArgs {
    /// Root directory, or a symlink to it.
    #[arg(long)]
    pub root: PathBuf,
}

/// Executes the `umount` command.
///
/// # Errors
///
/// Returns an error if the root is missing or an unmount keeps failing.
pub fn execute(args: &UmountArgs, config: SandrootConfig) -> anyhow::Result<()> {
    let handle = Orchestrator::new(config).umount(&args.root)?;
    crate::output::status("Unmounted", &handle.real_path().display().to_string());
    Ok(())
}
