use serde::Deserialize;
use std::path::PathBuf;

/// Location of the per-service output tree.
///
/// Each map-service folder under `outputs_dir` holds three subfolders:
/// `features/` (raw layer exports), `attributes/` (raw metadata plus the
/// decode table) and `final/` (merged tables).
#[derive(Deserialize, Debug, Clone)]
pub struct StoreConfig {
    pub outputs_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
        }
    }

    pub fn service_dir(&self, folder: &str) -> PathBuf {
        self.outputs_dir.join(folder)
    }

    pub fn features_dir(&self, folder: &str) -> PathBuf {
        self.service_dir(folder).join("features")
    }

    pub fn attributes_dir(&self, folder: &str) -> PathBuf {
        self.service_dir(folder).join("attributes")
    }

    pub fn final_dir(&self, folder: &str) -> PathBuf {
        self.service_dir(folder).join("final")
    }
}
