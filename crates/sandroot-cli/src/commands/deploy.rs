//! `sroot deploy`: Fetch an image and install it as a live root.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, ValueEnum};
use sandroot_common::config::SandrootConfig;
use sandroot_core::ownership::OwnershipSpec;
use sandroot_image::source::resolve_source;
use sandroot_runtime::orchestrator::{DeployMode, Orchestrator};

/// Arguments for the `deploy` command.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Image locator: a path, `file://`, `http(s)://` URL, or `-` for stdin.
    #[arg(long)]
    pub src: String,

    /// Live root directory (or symlink, in symlink mode).
    #[arg(long)]
    pub dest: PathBuf,

    /// Owner of the root directory, as a name or uid.
    #[arg(long)]
    pub user: Option<String>,

    /// Group of the root directory, as a name or gid.
    #[arg(long)]
    pub group: Option<String>,

    /// How the root reaches `--dest`.
    #[arg(long, value_enum, default_value_t = ModeArg::Rsync)]
    pub mode: ModeArg,
}

/// Deployment modes accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Sync into the destination directory in place.
    Rsync,
    /// Sync into a timestamped release and repoint the destination symlink.
    Symlink,
}

impl From<ModeArg> for DeployMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Rsync => Self::Rsync,
            ModeArg::Symlink => Self::Symlink,
        }
    }
}

/// Executes the `deploy` command.
///
/// # Errors
///
/// Returns an error if the source cannot be opened or any deploy step fails.
pub fn execute(args: DeployArgs, config: SandrootConfig) -> anyhow::Result<()> {
    let start = Instant::now();
    let ownership = OwnershipSpec::resolve(args.user.as_deref(), args.group.as_deref())?;

    let source = resolve_source(&args.src)?;
    let transfer = source.open()?;
    crate::output::status(
        "Fetching",
        &format!("{} ({})", source.locator(), crate::output::format_size(transfer.size)),
    );

    let handle = Orchestrator::new(config).deploy(
        transfer.reader,
        &args.dest,
        &ownership,
        args.mode.into(),
    )?;
    crate::output::status(
        "Deployed",
        &format!(
            "{} in {}",
            handle.real_path().display(),
            crate::output::format_elapsed(start.elapsed())
        ),
    );
    Ok(())
}
