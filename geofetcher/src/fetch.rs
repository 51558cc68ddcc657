//! Paginated feature retrieval and attribute/domain metadata for single
//! layers. Everything here is a pure function of (client, query params):
//! results come back as fresh values, never through shared accumulators.

use crate::client::{with_reauth, GeoClient};
use crate::error::{FetchError, Result};
use crate::services;
use chrono::NaiveDateTime;
use geostore::merge::DATE_FORMAT;
use geostore::DecodeTable;
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Records requested per paging query.
pub const PAGE_SIZE: usize = 1000;

/// `where` clause selecting every row of a layer.
pub const ALL_ROWS: &str = "('1' = '1')";

/// The directory listing is the only call with a deadline; paging queries
/// block as long as the server takes.
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(30);

/// One layer as listed by a map service's directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LayerInfo {
    pub id: u32,
    pub name: String,
}

/// Raw metadata body of a layer plus the decode table built from it.
#[derive(Debug, Clone)]
pub struct LayerAttributes {
    pub raw: Value,
    pub decode: DecodeTable,
}

fn service_url(base: &str, service_id: u32) -> String {
    format!("{base}Essentials/REST/sites/SIN/map/mapservices/{service_id}/rest/services/x/MapServer/")
}

fn layer_url(base: &str, service_id: u32, layer_id: u32) -> String {
    format!("{}{layer_id}", service_url(base, service_id))
}

fn query_url(base: &str, service_id: u32, layer_id: u32) -> String {
    format!("{}/query", layer_url(base, service_id, layer_id))
}

/// `where` clause selecting rows modified strictly after `since`.
pub fn modified_since_clause(since: &NaiveDateTime) -> String {
    format!("(DATEMODIFIED > DATE '{}')", since.format(DATE_FORMAT))
}

fn base_query_params(token: &str, where_clause: &str) -> Vec<(&'static str, String)> {
    vec![
        ("token", token.to_string()),
        ("f", "json".to_string()),
        ("returnGeometry", "true".to_string()),
        ("where", where_clause.to_string()),
        ("spatialRel", "esriSpatialRelIntersects".to_string()),
        ("outFields", "*".to_string()),
        ("outSR", "4326".to_string()),
    ]
}

/// Lists the layers a map service exposes.
pub fn service_directory(client: &mut GeoClient, service_id: u32) -> Result<Vec<LayerInfo>> {
    let url = service_url(client.base_url(), service_id);
    let body = with_reauth(client, |c| {
        c.query_data(
            &url,
            &[("f", "json".to_string()), ("token", c.token().to_string())],
            Some(DIRECTORY_TIMEOUT),
        )
    })?;
    let layers = body.get("layers").cloned().ok_or_else(|| {
        FetchError::UnexpectedBody(format!("no layers array for map service {service_id}"))
    })?;
    Ok(serde_json::from_value(layers)?)
}

/// Fetches every feature of a layer matching `where_clause`, paging with
/// offset/limit until a short page. Each rejected page triggers one
/// re-authentication and one retry of the same offset; layers on the
/// known-empty list short-circuit to zero features instead.
pub fn fetch_layer_features(
    client: &mut GeoClient,
    service_id: u32,
    layer_id: u32,
    where_clause: &str,
) -> Result<Vec<Value>> {
    let url = query_url(client.base_url(), service_id, layer_id);
    let mut features = Vec::new();
    let mut offset = 0usize;
    loop {
        let page = if services::is_known_empty(service_id, layer_id) {
            match query_page(client, &url, where_clause, offset) {
                Err(FetchError::TokenExpired(_)) => {
                    debug!("layer {layer_id} of map service {service_id} is expected to be empty");
                    return Ok(Vec::new());
                }
                other => other?,
            }
        } else {
            with_reauth(client, |c| query_page(c, &url, where_clause, offset))?
        };
        let count = page.len();
        features.extend(page);
        info!("retrieved {count} features (map service {service_id}, layer {layer_id})");
        if count < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }
    Ok(features)
}

fn query_page(client: &GeoClient, url: &str, where_clause: &str, offset: usize)
    -> Result<Vec<Value>> {
    let mut params = base_query_params(client.token(), where_clause);
    params.push(("resultOffset", offset.to_string()));
    params.push(("resultRecordCount", PAGE_SIZE.to_string()));
    let body = client.query_data(url, &params, None)?;
    match body.get("features") {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Ok(Vec::new()),
    }
}

/// Fetches a layer's field metadata (one request, no paging) and builds
/// its decode table. If the request is still rejected after one re-login,
/// the error body is kept as the raw metadata and the decode table comes
/// out empty, so the caller can persist it for inspection.
pub fn fetch_layer_attributes(
    client: &mut GeoClient,
    service_id: u32,
    layer_id: u32,
) -> Result<LayerAttributes> {
    let url = layer_url(client.base_url(), service_id, layer_id);
    let raw = match with_reauth(client, |c| {
        c.query_data(&url, &base_query_params(c.token(), ALL_ROWS), None)
    }) {
        Ok(body) => body,
        Err(FetchError::TokenExpired(body)) => {
            debug!("metadata request for layer {layer_id} of map service {service_id} kept failing");
            *body
        }
        Err(err) => return Err(err),
    };
    let decode = decode_table_from_metadata(&raw);
    Ok(LayerAttributes { raw, decode })
}

/// Builds a decode table from layer metadata: one entry per (code, label)
/// pair of every field with a non-empty coded-value domain, plus the type
/// subdomain keyed by `typeIdField` when the layer defines one.
pub fn decode_table_from_metadata(body: &Value) -> DecodeTable {
    let mut table = DecodeTable::new();
    if let Some(fields) = body.get("fields").and_then(Value::as_array) {
        for field in fields {
            let Some(name) = field.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(coded) = field.pointer("/domain/codedValues").and_then(Value::as_array)
            else {
                continue;
            };
            for pair in coded {
                if let (Some(code), Some(label)) =
                    (pair.get("code"), pair.get("name").and_then(Value::as_str))
                {
                    table.insert(name, code_key(code), label);
                }
            }
        }
    }
    if let (Some(type_field), Some(types)) = (
        body.get("typeIdField").and_then(Value::as_str),
        body.get("types").and_then(Value::as_array),
    ) {
        for entry in types {
            if let (Some(id), Some(name)) =
                (entry.get("id"), entry.get("name").and_then(Value::as_str))
            {
                table.insert(type_field, code_key(id), name);
            }
        }
    }
    table
}

/// Codes arrive as numbers or strings; either way the decode table keys by
/// the bare textual form.
fn code_key(code: &Value) -> String {
    match code {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
