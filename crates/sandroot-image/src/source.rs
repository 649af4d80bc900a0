//! Image source protocol handlers.
//!
//! A source turns a locator into a readable tar-gzip byte stream. Local
//! plain `.tar` files are gzipped on the fly so every consumer sees the
//! same format.

use std::io::Read;
use std::path::{Path, PathBuf};

use sandroot_common::error::{Result, SandrootError};

use crate::compress::compress;

/// An open image stream.
pub struct Transfer {
    /// Length of the stream in bytes, when the source knows it.
    pub size: Option<u64>,
    /// Compressed tar stream.
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Something that can yield an image stream.
pub trait ImageSource {
    /// Locator this source was resolved from, for diagnostics.
    fn locator(&self) -> &str;

    /// Opens the image stream.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Transfer` (or `NotFound` for missing local
    /// files) if the stream cannot be opened.
    fn open(&self) -> Result<Transfer>;
}

/// A local archive file.
#[derive(Debug, Clone)]
pub struct FileSource {
    locator: String,
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            locator: path.display().to_string(),
            path,
        }
    }

    /// Path of the archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileSource {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn open(&self) -> Result<Transfer> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandrootError::NotFound {
                    kind: "image archive",
                    id: self.locator.clone(),
                }
            } else {
                transfer_error(&self.locator, e)
            }
        })?;

        if is_plain_tar(&self.path) {
            tracing::debug!(path = %self.path.display(), "compressing plain tar on the fly");
            let stream = compress(file).map_err(|e| transfer_error(&self.locator, e))?;
            return Ok(Transfer {
                size: None,
                reader: Box::new(stream),
            });
        }

        let size = file.metadata().ok().map(|m| m.len());
        Ok(Transfer {
            size,
            reader: Box::new(file),
        })
    }
}

/// The process's standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinSource;

impl ImageSource for StdinSource {
    fn locator(&self) -> &str {
        "-"
    }

    fn open(&self) -> Result<Transfer> {
        Ok(Transfer {
            size: None,
            reader: Box::new(std::io::stdin()),
        })
    }
}

/// An archive served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
}

impl HttpSource {
    /// Creates a source fetching `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ImageSource for HttpSource {
    fn locator(&self) -> &str {
        &self.url
    }

    fn open(&self) -> Result<Transfer> {
        let response = reqwest::blocking::get(&self.url).map_err(|e| transfer_error(&self.url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SandrootError::Transfer {
                locator: self.url.clone(),
                message: format!("server answered {status}"),
            });
        }
        let size = response.content_length();
        tracing::info!(url = %self.url, size, "download started");
        Ok(Transfer {
            size,
            reader: Box::new(response),
        })
    }
}

/// Resolves a locator into an image source.
///
/// Accepted forms: `-` (standard input), `file:///path`, a bare path,
/// and `http://` / `https://` URLs.
///
/// # Errors
///
/// Returns `SandrootError::NotFound` for missing local files and
/// `SandrootError::Config` for unsupported schemes.
pub fn resolve_source(locator: &str) -> Result<Box<dyn ImageSource>> {
    if locator == "-" {
        tracing::info!("resolved stdin source");
        return Ok(Box::new(StdinSource));
    }
    if locator.starts_with("https://") || locator.starts_with("http://") {
        tracing::info!(url = locator, "resolved remote source");
        return Ok(Box::new(HttpSource::new(locator)));
    }

    let path_str = if let Some(rest) = locator.strip_prefix("file://") {
        rest
    } else if locator.contains("://") {
        return Err(SandrootError::Config {
            message: format!("unsupported image source URI scheme: {locator}"),
        });
    } else {
        locator
    };

    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(SandrootError::NotFound {
            kind: "image archive",
            id: path_str.to_owned(),
        });
    }
    tracing::info!(path = %path.display(), "resolved file source");
    Ok(Box::new(FileSource::new(path)))
}

/// Determines whether the archive is an uncompressed tar based on extension.
fn is_plain_tar(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("tar"))
}

fn transfer_error(locator: &str, err: impl std::fmt::Display) -> SandrootError {
    SandrootError::Transfer {
        locator: locator.to_owned(),
        message: err.to_string(),
    }
}
