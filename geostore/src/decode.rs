use crate::errors::Result;
use crate::layout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One coded-value mapping: attribute code `id` decodes to `name` in
/// column `column`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodeEntry {
    pub id: String,
    pub name: String,
    pub column: String,
}

/// Per-layer attribute decode table, persisted as a CSV with `id,name,column`
/// columns. Columns are matched case-insensitively: `index()` keys by the
/// upper-cased column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeTable {
    entries: Vec<DecodeEntry>,
}

impl DecodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, id: impl Into<String>, name: impl Into<String>) {
        self.entries.push(DecodeEntry {
            id: id.into(),
            name: name.into(),
            column: column.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[DecodeEntry] {
        &self.entries
    }

    /// Builds the lookup used by the merge engine: upper-cased column name
    /// to (code -> label).
    pub fn index(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut index: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for entry in &self.entries {
            index
                .entry(entry.column.to_uppercase())
                .or_default()
                .insert(entry.id.clone(), entry.name.clone());
        }
        index
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = Vec::new();
        for entry in reader.deserialize() {
            entries.push(entry?);
        }
        Ok(Self { entries })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for entry in &self.entries {
            writer.serialize(entry)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| crate::errors::StoreError::Malformed(err.to_string()))?;
        layout::write_atomic(path, &bytes)
    }
}
