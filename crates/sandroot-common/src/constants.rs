//! System-wide constants and defaults.

/// Number of unmount attempts before a busy mount is reported as an error.
pub const UNMOUNT_ATTEMPTS: u32 = 10;

/// Delay between unmount attempts, in milliseconds.
pub const UNMOUNT_DELAY_MS: u64 = 100;

/// Mode forced onto a deployed root directory.
pub const ROOT_DIR_MODE: u32 = 0o755;

/// Size of the buffer between the gzip encoder and the compression pipe.
pub const COMPRESSION_BUF_SIZE: usize = 32 * 1024;

/// Number of compressed chunks the pipe holds before the producer blocks.
pub const COMPRESSION_PIPE_DEPTH: usize = 4;

/// Directory sync program.
pub const RSYNC_PROGRAM: &str = "rsync";

/// Options passed to the sync program: archive copy, delete extraneous files.
pub const RSYNC_DEFAULT_OPTS: &[&str] = &["-a", "--delete"];

/// Host directories bind-mounted into a root before launching a process.
pub const SYSTEM_MOUNTS: &[&str] = &["/proc", "/sys", "/dev", "/dev/pts"];

/// Host files copied into a root before launching a process.
pub const COPY_FILES: &[&str] = &["/etc/hosts", "/etc/resolv.conf"];

/// Mount table of the calling process.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Prefix of staging directories created during deployment.
pub const STAGING_PREFIX: &str = "sandroot-stage.";

/// Timestamp format appended to release directories in symlink mode.
pub const RELEASE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "SANDROOT_CONFIG";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "sroot";
