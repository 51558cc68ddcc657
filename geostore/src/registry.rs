//! Last-modified registry: the merged final tables double as the record of
//! how far each layer has been synced. The maximum `DATEMODIFIED` seen per
//! layer bounds the next incremental fetch.

use crate::config::StoreConfig;
use crate::merge::DATE_FORMAT;
use crate::table::Table;
use chrono::NaiveDateTime;
use log::debug;
use std::collections::HashMap;
use std::fs;

const MODIFIED_COLUMN: &str = "DATEMODIFIED";

/// Scans every `final/*.csv` under the output tree and returns the maximum
/// parseable modification timestamp per layer name. Best effort: files
/// without the column, or with no parseable value, simply do not appear.
pub fn last_modified_dates(config: &StoreConfig) -> HashMap<String, NaiveDateTime> {
    let mut dates = HashMap::new();
    let Ok(services) = fs::read_dir(&config.outputs_dir) else {
        return dates;
    };
    for service in services.flatten() {
        let final_dir = service.path().join("final");
        let Ok(files) = fs::read_dir(&final_dir) else {
            continue;
        };
        for file in files.flatten() {
            let path = file.path();
            let Some(layer) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match max_modified(&path) {
                Some(date) => {
                    dates.insert(layer.to_string(), date);
                }
                None => debug!("no modification date in {}", path.display()),
            }
        }
    }
    dates
}

fn max_modified(path: &std::path::Path) -> Option<NaiveDateTime> {
    let table = Table::read_csv(path).ok()?;
    let col = table.column_index(MODIFIED_COLUMN)?;
    (0..table.row_count())
        .filter_map(|row| table.cell(row, col))
        .filter_map(|value| NaiveDateTime::parse_from_str(value, DATE_FORMAT).ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn finds_max_modified_per_layer() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        layout::ensure_service_layout(&config, "sin").unwrap();

        let table = Table::from_records(&[
            json!({"DATEMODIFIED": "2024-03-01 10:00:00"}),
            json!({"DATEMODIFIED": "2024-05-20 08:30:00"}),
            json!({"DATEMODIFIED": Option::<String>::None}),
        ]);
        table
            .write_csv(&layout::final_csv(&config, "sin", "Switch"))
            .unwrap();

        let dates = last_modified_dates(&config);
        assert_eq!(
            dates["Switch"].format(DATE_FORMAT).to_string(),
            "2024-05-20 08:30:00"
        );
    }

    #[test]
    fn skips_tables_without_the_column() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        layout::ensure_service_layout(&config, "sin").unwrap();

        let table = Table::from_records(&[json!({"OBJECTID": 1})]);
        table
            .write_csv(&layout::final_csv(&config, "sin", "Pole"))
            .unwrap();

        assert!(last_modified_dates(&config).is_empty());
    }
}
