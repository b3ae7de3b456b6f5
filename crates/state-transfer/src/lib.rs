//! Transport orchestration for migrating persistent volume data between clusters
//!
//! A [`Transfer`](transfer::Transfer) composes a [`Transport`](transport::Transport),
//! an [`Endpoint`](endpoint::Endpoint) and one cluster client per side. The transport
//! decides which objects (tunnel config, TLS material, containers, volumes) each side
//! needs and creates them idempotently; the transfer decides which cluster gets which
//! half and how callers address the tunnel.

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod pki;
pub mod scheme;
pub mod telemetry;
pub mod transfer;
pub mod transport;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key applied to every object created by this crate
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for objects created by this crate
pub const LABEL_MANAGED_BY_STATE_TRANSFER: &str = "state-transfer";
