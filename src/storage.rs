// File system operations for calibration profiles
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gestures::CalibrationProfile;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for Conductor
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("com.conductor.app");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Get the calibration profiles directory
pub fn get_calibration_dir() -> StorageResult<PathBuf> {
    let app_dir = get_app_data_dir()?;
    let calibration_dir = app_dir.join("calibration");
    fs::create_dir_all(&calibration_dir)?;
    Ok(calibration_dir)
}

/// File name for a profile: its name lowercased, anything but [a-z0-9_-] as '-'
pub fn profile_file_name(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let slug = if slug.is_empty() { "profile".to_string() } else { slug };
    format!("{}.json", slug)
}

/// Store a calibration profile in the app data directory
/// Returns its path and SHA256 hash
pub fn store_calibration_profile(profile: &CalibrationProfile) -> StorageResult<(PathBuf, String)> {
    let dir = get_calibration_dir()?;
    store_calibration_profile_in(&dir, profile)
}

/// Store a calibration profile under `dir`, replacing one with the same name
pub fn store_calibration_profile_in(dir: &Path, profile: &CalibrationProfile) -> StorageResult<(PathBuf, String)> {
    fs::create_dir_all(dir)?;
    let data = profile.to_json_bytes()?;
    let file_path = dir.join(profile_file_name(&profile.name));

    let mut file = fs::File::create(&file_path)?;
    file.write_all(&data)?;

    let hash = calculate_sha256(&data);
    log::info!("Stored calibration profile '{}' at {}", profile.name, file_path.display());

    Ok((file_path, hash))
}

pub fn load_calibration_profile(path: &Path) -> StorageResult<CalibrationProfile> {
    let data = fs::read(path)?;
    Ok(CalibrationProfile::from_json_bytes(&data)?)
}

/// Profile files under `dir`, sorted by path
pub fn list_calibration_profiles_in(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
