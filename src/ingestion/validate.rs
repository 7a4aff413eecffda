//! File-level checks shared by every parser.

use std::fs::File;
use std::path::Path;

use crate::config::EngineConfig;
use crate::error::{ImportResult, ParseError};

/// Check that `path` exists, is readable, non-empty, under the size cap and has one of
/// `extensions`. Returns the file size.
pub(crate) fn validate_file(
    path: &Path,
    config: &EngineConfig,
    extensions: &[&str],
) -> ImportResult<u64> {
    if !path.exists() {
        return Err(ParseError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let not_readable = |source| ParseError::NotReadable {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(not_readable)?;
    if !metadata.is_file() {
        return Err(not_readable(std::io::Error::other("not a regular file")));
    }
    File::open(path).map_err(not_readable)?;

    let size = metadata.len();
    if size == 0 {
        return Err(ParseError::Empty {
            path: path.to_path_buf(),
        });
    }
    if size > config.max_file_size {
        return Err(ParseError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: config.max_file_size,
        });
    }

    let extension = extension_of(path);
    if !extensions.contains(&extension.as_str()) {
        return Err(ParseError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension,
        });
    }

    Ok(size)
}

/// Lowercased extension, empty when the path has none.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}
