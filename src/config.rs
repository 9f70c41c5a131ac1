use crate::error::*;
use directories::ProjectDirs;
use std::path::*;

pub const PROJECT_NAME: &str = "layerpush";

/// Project root data directory
pub fn data_dir() -> Result<PathBuf> {
    let p = ProjectDirs::from("", PROJECT_NAME, PROJECT_NAME).ok_or(Error::NoValidHomeDirectory)?;
    Ok(p.data_dir().to_owned())
}

/// Directory of the persistent blob store used when no directory is given
pub fn default_store_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("store"))
}
