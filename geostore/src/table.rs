use crate::errors::Result;
use crate::layout;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// A row-oriented table with nullable string cells, the in-memory form of
/// every CSV this pipeline reads or writes. An empty CSV field round-trips
/// as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Case-insensitive column lookup; decode tables key columns by their
    /// upper-cased name while layer exports keep the server's casing.
    pub fn column_index_ci(&self, name: &str) -> Option<usize> {
        let upper = name.to_uppercase();
        self.columns.iter().position(|c| c.to_uppercase() == upper)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).and_then(|c| c.as_deref())
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: Option<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    /// Returns the index of `name`, appending a new all-null column if the
    /// table does not have it yet.
    pub fn add_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    pub fn rename_columns(&mut self, rename: impl Fn(&str) -> String) {
        for column in &mut self.columns {
            *column = rename(column);
        }
    }

    /// Rewrites every cell of one column through `transform`.
    pub fn map_column(&mut self, col: usize, transform: impl Fn(Option<&str>) -> Option<String>) {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(col) {
                *cell = transform(cell.as_deref());
            }
        }
    }

    /// Flattens raw JSON feature records into a table. Nested objects get
    /// dotted column names (`attributes.STATUS`, `geometry.rings`); arrays
    /// are kept as JSON literals in the cell. Column order is first-seen.
    pub fn from_records(records: &[Value]) -> Self {
        let mut table = Self::new();
        for record in records {
            let Some(object) = record.as_object() else {
                continue;
            };
            let mut flat = Vec::new();
            for (key, value) in object {
                flatten_into(key, value, &mut flat);
            }
            let mut row = vec![None; table.columns.len()];
            for (key, value) in flat {
                let idx = table.add_column(&key);
                if idx >= row.len() {
                    row.resize(table.columns.len(), None);
                }
                row[idx] = value;
            }
            row.resize(table.columns.len(), None);
            table.rows.push(row);
        }
        let width = table.columns.len();
        for row in &mut table.rows {
            row.resize(width, None);
        }
        table
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let columns = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            None
                        } else {
                            Some(field.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(Self { columns, rows })
    }

    /// Serializes the table and replaces `path` atomically.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| crate::errors::StoreError::Malformed(err.to_string()))?;
        layout::write_atomic(path, &bytes)
    }

    /// Appends every row of `other`, unioning the column sets. Columns
    /// missing on either side are filled with nulls.
    pub fn append(&mut self, other: Table) {
        if self.columns.is_empty() {
            *self = other;
            return;
        }
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|column| self.add_column(column))
            .collect();
        let width = self.columns.len();
        for row in other.rows {
            let mut merged = vec![None; width];
            for (cell, &dst) in row.into_iter().zip(&mapping) {
                merged[dst] = cell;
            }
            self.rows.push(merged);
        }
    }

    /// Drops rows whose values in `key` repeat an earlier row's, keeping
    /// the first occurrence. Stable.
    pub fn dedup_by_columns(&mut self, key: &[usize]) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| {
            let fingerprint: Vec<Option<String>> =
                key.iter().map(|&col| row.get(col).cloned().flatten()).collect();
            seen.insert(fingerprint)
        });
    }

    /// Columns that hold no nested list literal in any row. Used as the
    /// dedup key for incremental syncs: composite cells (geometry
    /// coordinate lists) are not reliably comparable, so they are excluded.
    pub fn scalar_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&col| {
                !self.rows.iter().any(|row| {
                    row.get(col)
                        .and_then(|cell| cell.as_deref())
                        .is_some_and(|value| value.trim_start().starts_with('['))
                })
            })
            .collect()
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, Option<String>)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&format!("{prefix}.{key}"), child, out);
            }
        }
        Value::Null => out.push((prefix.to_string(), None)),
        Value::String(text) => out.push((prefix.to_string(), Some(text.clone()))),
        other => out.push((prefix.to_string(), Some(other.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn flattens_records_with_dotted_prefixes() {
        let records = vec![
            json!({"attributes": {"OBJECTID": 1, "STATUS": 2}, "geometry": {"rings": [[[0.0, 0.0], [2.0, 2.0]]]}}),
            json!({"attributes": {"OBJECTID": 2, "OWNER": "sin"}}),
        ];
        let table = Table::from_records(&records);
        assert_eq!(
            table.columns(),
            [
                "attributes.OBJECTID",
                "attributes.STATUS",
                "geometry.rings",
                "attributes.OWNER"
            ]
        );
        assert_eq!(table.cell(0, 0), Some("1"));
        assert_eq!(table.cell(0, 2), Some("[[[0.0,0.0],[2.0,2.0]]]"));
        // second record never saw STATUS or rings
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.cell(1, 2), None);
        assert_eq!(table.cell(1, 3), Some("sin"));
    }

    #[test]
    fn csv_round_trip_preserves_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layer.csv");
        let table = Table::from_records(&[
            json!({"attributes": {"A": 1, "B": Value::Null}}),
            json!({"attributes": {"A": 2, "B": "x"}}),
        ]);
        table.write_csv(&path).unwrap();
        let restored = Table::read_csv(&path).unwrap();
        assert_eq!(restored, table);
        assert_eq!(restored.cell(0, 1), None);
    }

    #[test]
    fn append_unions_columns() {
        let mut base = Table::from_records(&[json!({"attributes": {"A": 1}})]);
        let fresh = Table::from_records(&[json!({"attributes": {"A": 2, "B": 3}})]);
        base.append(fresh);
        assert_eq!(base.columns(), ["attributes.A", "attributes.B"]);
        assert_eq!(base.row_count(), 2);
        assert_eq!(base.cell(0, 1), None);
        assert_eq!(base.cell(1, 1), Some("3"));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut table = Table::from_records(&[
            json!({"attributes": {"ID": 1, "NOTE": "old"}}),
            json!({"attributes": {"ID": 2, "NOTE": "keep"}}),
            json!({"attributes": {"ID": 1, "NOTE": "old"}}),
        ]);
        let key: Vec<usize> = (0..table.columns().len()).collect();
        table.dedup_by_columns(&key);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 1), Some("old"));
        assert_eq!(table.cell(1, 1), Some("keep"));
    }

    #[test]
    fn scalar_columns_exclude_list_literals() {
        let table = Table::from_records(&[
            json!({"attributes": {"ID": 1}, "geometry": {"rings": [[[0.0, 0.0]]]}}),
        ]);
        assert_eq!(table.scalar_columns(), vec![0]);
    }
}
