//! Online half of the map-service extraction pipeline: portal
//! authentication, the REST gateway, paginated feature and attribute
//! fetching, and the full/incremental sync orchestration over `geostore`.

pub mod auth;
pub mod client;
pub mod error;
pub mod fetch;
pub mod html;
pub mod services;
pub mod sync;

pub use crate::auth::{Authenticator, Credentials, PortalUrls};
pub use crate::client::{GeoClient, LayerGateway};
pub use crate::error::{FetchError, Result};
