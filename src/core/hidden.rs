//! Hidden-attribute marking for the session root.
//!
//! Windows gets `FILE_ATTRIBUTE_HIDDEN`. Elsewhere there is no attribute to
//! set; the root name's marker prefix is the only signal.

use std::path::Path;

use super::error::HiddenAttributeError;

/// Mark `path` hidden, keeping its other attributes
#[cfg(windows)]
pub fn mark_hidden(path: &Path) -> Result<(), HiddenAttributeError> {
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::{
        GetFileAttributesW, SetFileAttributesW, FILE_ATTRIBUTE_HIDDEN, FILE_FLAGS_AND_ATTRIBUTES,
        INVALID_FILE_ATTRIBUTES,
    };

    let wide = HSTRING::from(path);
    let failure = |message: String| HiddenAttributeError::AttributeSetFailure {
        path: path.to_path_buf(),
        message,
    };

    // SAFETY: `wide` is a valid, NUL-terminated UTF-16 string for the call's duration.
    unsafe {
        let current = GetFileAttributesW(&wide);
        if current == INVALID_FILE_ATTRIBUTES {
            return Err(failure(std::io::Error::last_os_error().to_string()));
        }
        SetFileAttributesW(&wide, FILE_FLAGS_AND_ATTRIBUTES(current | FILE_ATTRIBUTE_HIDDEN.0))
            .map_err(|e| failure(e.to_string()))
    }
}

#[cfg(not(windows))]
pub fn mark_hidden(path: &Path) -> Result<(), HiddenAttributeError> {
    tracing::debug!(path = %path.display(), "No hidden attribute on this platform");
    Ok(())
}

/// Whether `path` carries the hidden attribute (always false off Windows)
#[cfg(windows)]
pub fn is_hidden(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_HIDDEN;

    std::fs::metadata(path)
        .map(|meta| meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN.0 != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
pub fn is_hidden(_path: &Path) -> bool {
    false
}
