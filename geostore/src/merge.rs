//! The merge/decode engine: joins a raw layer export with its decode
//! table, producing the final human-readable table. Pure with respect to
//! its inputs; `merge_service_outputs` adds the file-walking shell around
//! it.

use crate::config::StoreConfig;
use crate::decode::DecodeTable;
use crate::errors::Result;
use crate::layout;
use crate::table::Table;
use log::{info, warn};
use std::fs;

/// Timestamp format shared by merged tables and the last-modified registry.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Epoch-millisecond ceiling (~year 2053); the upstream stores garbage
/// sentinel dates far beyond it.
const MAX_EPOCH_MS: f64 = 2_647_813_300_000.0;

/// Numeric code the upstream uses for originally-missing attribute values.
const MISSING_CODE: i64 = -1;

/// Column-name prefixes left over from flattening the wire records.
const COLUMN_PREFIXES: [&str; 2] = ["attributes.", "geometry."];

/// Geometry columns a centroid can be derived from.
const GEOMETRY_COLUMNS: [&str; 2] = ["rings", "paths"];

/// Runs the full merge over one raw export. Row count is preserved: every
/// step only rewrites or appends columns.
pub fn merge(raw: &Table, decode: &DecodeTable) -> Table {
    let mut table = raw.clone();
    strip_prefixes(&mut table);
    sanitize_dates(&mut table);
    decode_columns(&mut table, decode);
    derive_centroids(&mut table);
    table
}

fn strip_prefixes(table: &mut Table) {
    table.rename_columns(|name| {
        let mut name = name;
        for prefix in COLUMN_PREFIXES {
            name = name.strip_prefix(prefix).unwrap_or(name);
        }
        name.to_string()
    });
}

/// Every column whose name contains `DATE` holds epoch milliseconds.
/// Unparseable, negative, or out-of-range values are nulled; the rest
/// become calendar timestamps.
fn sanitize_dates(table: &mut Table) {
    let date_columns: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains("DATE"))
        .map(|(idx, _)| idx)
        .collect();
    for col in date_columns {
        table.map_column(col, sanitize_date_cell);
    }
}

fn sanitize_date_cell(cell: Option<&str>) -> Option<String> {
    let millis: f64 = cell?.parse().ok()?;
    if !millis.is_finite() || millis < 0.0 || millis > MAX_EPOCH_MS {
        return None;
    }
    let timestamp = chrono::DateTime::from_timestamp_millis(millis as i64)?;
    Some(timestamp.format(DATE_FORMAT).to_string())
}

/// Replaces coded attribute values by their labels. Numeric columns are
/// cast to integer codes first, with the missing-value sentinel decoding
/// to null; unmapped codes also decode to null, never an error.
fn decode_columns(table: &mut Table, decode: &DecodeTable) {
    for (column, codes) in decode.index() {
        let Some(idx) = table.column_index_ci(&column) else {
            continue;
        };
        let numeric = column_is_numeric(table, idx);
        table.map_column(idx, |cell| {
            let value = cell?;
            let key = if numeric {
                let code = value.parse::<f64>().ok()? as i64;
                if code == MISSING_CODE {
                    return None;
                }
                code.to_string()
            } else {
                value.to_string()
            };
            codes.get(&key).cloned()
        });
    }
}

fn column_is_numeric(table: &Table, col: usize) -> bool {
    let mut any_value = false;
    for row in 0..table.row_count() {
        if let Some(value) = table.cell(row, col) {
            if value.parse::<f64>().is_err() {
                return false;
            }
            any_value = true;
        }
    }
    any_value
}

/// Appends `x`/`y` columns holding the mean coordinate of the first ring
/// or path. Deliberately not an area-weighted centroid: the mean of the
/// first part is enough for a representative point.
fn derive_centroids(table: &mut Table) {
    for geometry in GEOMETRY_COLUMNS {
        let Some(col) = table.column_index(geometry) else {
            continue;
        };
        let x_col = table.add_column("x");
        let y_col = table.add_column("y");
        for row in 0..table.row_count() {
            let Some(literal) = table.cell(row, col).map(str::to_string) else {
                continue;
            };
            let point = centroid(&literal);
            table.set_cell(row, x_col, point.map(|(x, _)| x.to_string()));
            table.set_cell(row, y_col, point.map(|(_, y)| y.to_string()));
        }
    }
}

/// Mean (x, y) over the points of the first ring/path of a JSON geometry
/// literal. Empty or malformed geometry yields no point.
fn centroid(literal: &str) -> Option<(f64, f64)> {
    let parts: Vec<Vec<Vec<f64>>> = serde_json::from_str(literal).ok()?;
    let first = parts.first()?;
    if first.is_empty() {
        return None;
    }
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for point in first {
        sum_x += point.first()?;
        sum_y += point.get(1)?;
    }
    let count = first.len() as f64;
    Some((sum_x / count, sum_y / count))
}

/// Merges every feature export under one service folder with its decode
/// table, writing `final/<layer>.csv`. Malformed files and missing decode
/// tables are logged and skipped so one bad layer never aborts the pass.
pub fn merge_service_outputs(config: &StoreConfig, folder: &str) -> Result<()> {
    let features_dir = config.features_dir(folder);
    if !features_dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(config.final_dir(folder))?;
    for entry in fs::read_dir(&features_dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "csv") {
            continue;
        }
        let Some(layer) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let raw = match Table::read_csv(&path) {
            Ok(table) => table,
            Err(err) => {
                warn!("skipping malformed feature export {}: {err}", path.display());
                continue;
            }
        };
        if raw.is_empty() {
            continue;
        }
        let decode_path = layout::attribute_csv(config, folder, layer);
        let decode = match DecodeTable::read_csv(&decode_path) {
            Ok(table) => table,
            Err(err) => {
                warn!("no usable decode table for {folder}/{layer}: {err}");
                DecodeTable::new()
            }
        };
        let merged = merge(&raw, &decode);
        merged.write_csv(&layout::final_csv(config, folder, layer))?;
        info!("saved final table {folder}/{layer}");
    }
    Ok(())
}
