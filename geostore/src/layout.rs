use crate::config::StoreConfig;
use crate::errors::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Creates the full output tree for one map-service folder.
///
/// Idempotent; run once before any fetch so the fetch and merge code never
/// has to probe for directories.
pub fn ensure_service_layout(config: &StoreConfig, folder: &str) -> Result<()> {
    fs::create_dir_all(config.features_dir(folder))?;
    fs::create_dir_all(config.attributes_dir(folder))?;
    fs::create_dir_all(config.final_dir(folder))?;
    Ok(())
}

/// Raw feature export for a layer.
pub fn feature_csv(config: &StoreConfig, folder: &str, layer: &str) -> PathBuf {
    config.features_dir(folder).join(format!("{layer}.csv"))
}

/// Raw attribute metadata body, persisted verbatim for inspection.
pub fn attribute_raw(config: &StoreConfig, folder: &str, layer: &str) -> PathBuf {
    config.attributes_dir(folder).join(layer)
}

/// Decode table for a layer, `id,name,column` rows.
pub fn attribute_csv(config: &StoreConfig, folder: &str, layer: &str) -> PathBuf {
    config.attributes_dir(folder).join(format!("{layer}.csv"))
}

/// Merged output table for a layer.
pub fn final_csv(config: &StoreConfig, folder: &str, layer: &str) -> PathBuf {
    config.final_dir(folder).join(format!("{layer}.csv"))
}

/// Writes `bytes` to `path` through a sibling temp file and an atomic
/// rename, so a crash mid-write never leaves a truncated snapshot behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
