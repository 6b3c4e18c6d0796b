//! Device media server access
//!
//! Once the device is on Wi-Fi it serves its recordings over HTTP. This
//! module discovers the server address from the connection state and talks
//! to it.
//!
//! # Module Structure
//!
//! - `client` - HTTP gateway for listing, uploading, applying and downloading files
//! - `endpoint` - Base URL discovery driven by the connection state
//! - `models` - Wire types
//! - `url` - Base URL normalisation
//! - `error` - Error types

mod client;
mod endpoint;
mod error;
mod models;
mod url;

pub use client::{DeviceMediaGateway, HttpMediaGateway};
pub use endpoint::DeviceEndpointProvider;
pub use error::{MediaError, MediaResult};
pub use models::DeviceMediaFile;
pub use url::{absolute_url, build_base_url, normalize_base_url};
