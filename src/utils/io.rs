use crate::models::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Ensure parent directory exists, creating it if needed.
///
/// # Errors
/// Returns `std::io::Error` if directory creation fails.
pub fn ensure_parent_dir(path: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = Path::new(path).parent() {
        if parent != Path::new("") {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read and deserialize JSON from file.
///
/// # Errors
/// Returns `StoreError::Io` if the file cannot be read and
/// `StoreError::Json` if its content is not valid JSON for `T`.
pub fn read_json_file<T: DeserializeOwned>(path: &str) -> Result<T, StoreError> {
    let s = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&s).map_err(|source| StoreError::Json {
        origin: path.to_string(),
        source,
    })
}

/// Write data as pretty JSON, replacing the file only once the new
/// content is fully on disk.
///
/// # Errors
/// Returns `StoreError` if serialization or any filesystem step fails.
pub fn write_json_file<T: Serialize + ?Sized>(path: &str, data: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_string(),
        source,
    };

    ensure_parent_dir(path).map_err(io_err)?;
    let json = serde_json::to_string_pretty(data).map_err(|source| StoreError::Json {
        origin: path.to_string(),
        source,
    })?;

    let tmp = format!("{path}.tmp");
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
