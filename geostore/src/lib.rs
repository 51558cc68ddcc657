//! Offline half of the map-service extraction pipeline.
//!
//! `geostore` owns everything that happens after the wire: the CSV-backed
//! row tables the fetchers persist, the per-service output directory
//! layout, attribute decode tables, the merge/decode engine that turns raw
//! layer exports into the final human-readable tables, and the
//! last-modified registry that seeds incremental syncs. Nothing in this
//! crate touches the network.

pub mod config;
pub mod decode;
pub mod errors;
pub mod layout;
pub mod merge;
pub mod registry;
pub mod table;

pub use crate::config::StoreConfig;
pub use crate::decode::DecodeTable;
pub use crate::table::Table;
