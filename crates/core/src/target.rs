//! Conversion of path-like URL inputs to local paths

use crate::error::WatchError;
use std::path::PathBuf;
use url::Url;

/// Convert a `file:` URL to a local path
///
/// Anything else (other schemes, a non-local host) is an `InvalidTarget`.
pub fn path_from_url(url: &Url) -> Result<PathBuf, WatchError> {
    if url.scheme() != "file" {
        return Err(invalid(url.as_str()));
    }
    url.to_file_path().map_err(|_| invalid(url.as_str()))
}

/// Parse `input` as a URL and convert it with [`path_from_url`]
pub fn path_from_url_str(input: &str) -> Result<PathBuf, WatchError> {
    let url = Url::parse(input).map_err(|_| invalid(input))?;
    path_from_url(&url)
}

fn invalid(input: &str) -> WatchError {
    WatchError::InvalidTarget {
        input: input.to_string(),
    }
}
