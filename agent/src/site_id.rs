use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Reads the site id from `path`, or generates a UUID v4 and writes it there.
///
/// An empty file is treated as missing.
pub fn load_or_create_site_id(path: &Path) -> Result<String> {
    if path.exists() {
        let raw = fs::read_to_string(path).context("Failed to read site id file")?;
        let site_id = raw.trim();
        if !site_id.is_empty() {
            info!("Loaded site id from {:?}", path);
            return Ok(site_id.to_string());
        }
    }

    info!("Generating new site id at {:?}", path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create site id directory")?;
        }
    }
    let site_id = uuid::Uuid::new_v4().to_string();
    fs::write(path, &site_id).context("Failed to write site id file")?;
    Ok(site_id)
}
