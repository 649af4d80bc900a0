//! Tar-gzip extraction into a staging directory.
//!
//! The archive is consumed as a stream and never written to disk. A read
//! failure of the underlying source is reported as a transfer failure, and
//! anything else that goes wrong while decoding or unpacking is reported
//! as an extraction failure.

use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sandroot_common::error::{Result, SandrootError};
use sandroot_core::ownership::OwnershipSpec;

/// Wraps the raw image stream and remembers whether it failed.
struct SourceReader<R> {
    inner: R,
    failure: Option<String>,
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|e| {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failure = Some(e.to_string());
            }
        })
    }
}

/// Extracts a tar-gzip `stream` into `dest`, which must already exist.
///
/// Existing files in `dest` are overwritten entry by entry. Entries that
/// would land outside `dest` are skipped. When `ownership` differs from
/// the caller's identity, every extracted entry is handed to it.
///
/// Returns the number of entries unpacked.
///
/// # Errors
///
/// - `SandrootError::Transfer` if reading `stream` itself fails.
/// - `SandrootError::Extraction` if the data is not a valid tar-gzip archive
///   or an entry cannot be written.
pub fn stage<R: Read>(stream: R, dest: &Path, ownership: &OwnershipSpec) -> Result<usize> {
    let reader = SourceReader {
        inner: stream,
        failure: None,
    };
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    let chown = (*ownership != OwnershipSpec::current()).then_some(*ownership);
    match unpack_entries(&mut archive, dest, chown) {
        Ok(count) => {
            tracing::info!(dest = %dest.display(), entries = count, "archive staged");
            Ok(count)
        }
        Err(e) => {
            let source = archive.into_inner().into_inner();
            Err(match source.failure {
                Some(message) => SandrootError::Transfer {
                    locator: "image stream".into(),
                    message,
                },
                None => SandrootError::Extraction {
                    target: dest.to_path_buf(),
                    source: e,
                },
            })
        }
    }
}

fn unpack_entries<R: Read>(
    archive: &mut tar::Archive<R>,
    dest: &Path,
    chown: Option<OwnershipSpec>,
) -> io::Result<usize> {
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if !entry.unpack_in(dest)? {
            tracing::warn!(entry = %path.display(), "entry escapes staging directory, skipped");
            continue;
        }
        if let Some(owner) = chown {
            if let Some(relative) = staged_relative(&path) {
                std::os::unix::fs::lchown(dest.join(relative), Some(owner.uid), Some(owner.gid))?;
            }
        }
        tracing::trace!(entry = %path.display(), "unpacked");
        count += 1;
    }
    Ok(count)
}

/// Maps an entry path to where `unpack_in` put it, relative to the
/// staging directory. Leading `/` and `.` components are dropped.
fn staged_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}
