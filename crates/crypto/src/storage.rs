//! Filesystem-based identity storage

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::identity::Identity;

/// Default directory for storing identity
fn default_identity_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".zkattr")
}

/// Load identity from a hex seed file
pub fn load_identity(path: Option<&Path>) -> Result<Identity> {
    let seed_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| default_identity_dir().join("seed"));

    if !seed_path.exists() {
        anyhow::bail!(
            "Identity file not found. Please run 'zkattr keygen' first.\nLooked in: {}",
            seed_path.display()
        );
    }

    let content = fs::read_to_string(&seed_path).context("failed to read identity file")?;
    let seed = seed_from_hex(&content)?;
    Ok(Identity::from_seed(seed))
}

/// Save identity seed to file
pub fn save_identity(identity: &Identity, path: Option<&Path>) -> Result<PathBuf> {
    let seed_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| default_identity_dir().join("seed"));

    if let Some(dir) = seed_path.parent() {
        fs::create_dir_all(dir).context("failed to create identity directory")?;
    }

    let hex_seed = hex::encode(identity.seed());
    fs::write(&seed_path, hex_seed).context("failed to write seed file")?;

    Ok(seed_path)
}

fn seed_from_hex(content: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(content.trim()).context("seed file is not valid hex")?;
    if bytes.len() != 32 {
        anyhow::bail!("seed must be 32 bytes, got {}", bytes.len());
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}
