//! Linux capability management for least-privilege execution.
//!
//! Drops every capability from the bounding set except those explicitly
//! kept. The highest index supported by the running kernel is discovered
//! by probing: the first index the kernel rejects with `EINVAL` ends the
//! loop. This relies on kernel capability numbering being contiguous.

use std::collections::BTreeSet;

use nix::errno::Errno;
use sandroot_common::error::{Result, SandrootError};

/// Kernel capability names, indexed by capability number.
pub const CAPABILITY_NAMES: [&str; 41] = [
    "chown",
    "dac_override",
    "dac_read_search",
    "fowner",
    "fsetid",
    "kill",
    "setgid",
    "setuid",
    "setpcap",
    "linux_immutable",
    "net_bind_service",
    "net_broadcast",
    "net_admin",
    "net_raw",
    "ipc_lock",
    "ipc_owner",
    "sys_module",
    "sys_rawio",
    "sys_chroot",
    "sys_ptrace",
    "sys_pacct",
    "sys_admin",
    "sys_boot",
    "sys_nice",
    "sys_resource",
    "sys_time",
    "sys_tty_config",
    "mknod",
    "lease",
    "audit_write",
    "audit_control",
    "setfcap",
    "mac_override",
    "mac_admin",
    "syslog",
    "wake_alarm",
    "block_suspend",
    "audit_read",
    "perfmon",
    "bpf",
    "checkpoint_restore",
];

/// Parses a capability given as a number or a name.
///
/// Names are case-insensitive and the `CAP_` prefix is optional, so
/// `CAP_NET_BIND_SERVICE`, `net_bind_service` and `10` are equivalent.
///
/// # Errors
///
/// Returns `SandrootError::Config` if the name is unknown.
pub fn parse_capability(name: &str) -> Result<u32> {
    let trimmed = name.trim();
    if let Ok(index) = trimmed.parse::<u32>() {
        return Ok(index);
    }
    let lower = trimmed.to_ascii_lowercase();
    let bare = lower.strip_prefix("cap_").unwrap_or(&lower);
    CAPABILITY_NAMES
        .iter()
        .position(|known| *known == bare)
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| SandrootError::Config {
            message: format!("unknown capability: {name}"),
        })
}

/// Returns the `CAP_*` name of a capability index, if known.
#[must_use]
pub fn capability_name(index: u32) -> Option<String> {
    CAPABILITY_NAMES
        .get(usize::try_from(index).ok()?)
        .map(|name| format!("CAP_{}", name.to_ascii_uppercase()))
}

/// The set of capability indices to keep when dropping.
///
/// Built once per launch and never modified afterward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    keep: BTreeSet<u32>,
}

impl CapabilitySet {
    /// Creates a keep-set from capability indices.
    pub fn new(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            keep: indices.into_iter().collect(),
        }
    }

    /// Creates a keep-set from capability names or numbers.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Config` on the first unknown name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let keep = names
            .iter()
            .map(|n| parse_capability(n.as_ref()))
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(Self { keep })
    }

    /// Returns whether the capability is kept.
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.keep.contains(&index)
    }

    /// Number of kept capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keep.len()
    }

    /// Returns whether no capability is kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keep.is_empty()
    }

    /// Iterates the kept indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.keep.iter().copied()
    }
}

/// Access to a process capability bounding set.
pub trait BoundingSet {
    /// Reports whether `index` is in the bounding set.
    ///
    /// `Err(Errno::EINVAL)` means the running kernel has no capability with
    /// this index. This is the only query that decides where probing stops.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn read(&self, index: u32) -> std::result::Result<bool, Errno>;

    /// Removes `index` from the bounding set.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the kernel.
    fn drop_index(&mut self, index: u32) -> std::result::Result<(), Errno>;
}

/// The calling process's bounding set, accessed through `prctl(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelBoundingSet;

impl BoundingSet for KernelBoundingSet {
    fn read(&self, index: u32) -> std::result::Result<bool, Errno> {
        let zero: libc::c_ulong = 0;
        // SAFETY: PR_CAPBSET_READ only reads process state; any index is accepted
        // and out-of-range ones yield EINVAL.
        let rc = unsafe {
            libc::prctl(
                libc::PR_CAPBSET_READ,
                libc::c_ulong::from(index),
                zero,
                zero,
                zero,
            )
        };
        Errno::result(rc).map(|v| v == 1)
    }

    fn drop_index(&mut self, index: u32) -> std::result::Result<(), Errno> {
        let zero: libc::c_ulong = 0;
        // SAFETY: PR_CAPBSET_DROP takes a plain integer and touches no memory
        // owned by this process.
        let rc = unsafe {
            libc::prctl(
                libc::PR_CAPBSET_DROP,
                libc::c_ulong::from(index),
                zero,
                zero,
                zero,
            )
        };
        Errno::result(rc).map(|_| ())
    }
}

/// Drops every capability of the calling process except those in `keep`.
///
/// The keep-set is consumed: dropping is a one-way transition performed
/// right before the process image is replaced.
///
/// Returns the first index the kernel rejected, which is the number of
/// capabilities the running kernel supports.
///
/// # Errors
///
/// See [`drop_bounding_set`].
#[allow(clippy::needless_pass_by_value)]
pub fn drop_capabilities(keep: CapabilitySet) -> Result<u32> {
    drop_bounding_set(&mut KernelBoundingSet, &keep)
}

/// Probes and drops capabilities from `set`, starting at index 0.
///
/// Every index is read, kept or not, and a read that fails with `EINVAL`
/// stops the loop, so the returned index is the number of capabilities
/// the kernel supports. For each index not kept: a drop that fails with
/// `EINVAL` is skipped (the bit is not supported here); a drop that fails
/// with `EPERM` aborts the whole request.
///
/// # Errors
///
/// - `SandrootError::PermissionDenied` if the caller may not drop
///   capabilities (missing `CAP_SETPCAP`).
/// - `SandrootError::CapabilityDropFailed` if probing stopped at index 0
///   or the kernel returned an unexpected errno.
pub fn drop_bounding_set<B: BoundingSet>(set: &mut B, keep: &CapabilitySet) -> Result<u32> {
    tracing::info!(retained = keep.len(), "dropping capabilities");

    let mut index: u32 = 0;
    let mut dropped: u32 = 0;
    loop {
        match set.read(index) {
            Ok(_) => {}
            Err(Errno::EINVAL) => break,
            Err(e) => {
                return Err(SandrootError::CapabilityDropFailed {
                    message: format!("reading capability {index}: {e}"),
                });
            }
        }
        if keep.contains(index) {
            index += 1;
            continue;
        }

        match set.drop_index(index) {
            Ok(()) => {
                tracing::trace!(index, name = capability_name(index).as_deref(), "capability dropped");
                dropped += 1;
            }
            Err(Errno::EINVAL) => {
                tracing::debug!(index, "capability not supported, skipping");
            }
            Err(Errno::EPERM) => {
                return Err(SandrootError::PermissionDenied {
                    message: "dropping capabilities requires CAP_SETPCAP".into(),
                });
            }
            Err(e) => {
                return Err(SandrootError::CapabilityDropFailed {
                    message: format!("dropping capability {index}: {e}"),
                });
            }
        }
        index += 1;
    }

    if index == 0 {
        return Err(SandrootError::CapabilityDropFailed {
            message: "the kernel rejected capability 0; probing is not supported".into(),
        });
    }

    tracing::debug!(supported = index, dropped, "capability bounding set reduced");
    Ok(index)
}
