//! Transfers: a transport, an endpoint and two clusters
//!
//! The free functions here are the entry points a migration controller calls.
//! They decide which cluster gets which half of the transport and how the sync
//! tool addresses its peer, so callers never need to know whether a tunnel is
//! interposed.

pub mod health;
mod pvc;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::client::{ClusterClient, ObjectKey};
use crate::endpoint::Endpoint;
use crate::scheme::server_scheme;
use crate::transport::Transport;
use crate::Error;

pub use health::{are_containers_ready, are_filtered_pods_healthy, is_pod_healthy};
pub use pvc::PvcTransfer;

/// Hostname the sync tool dials when a tunnel terminates in its own pod
pub const LOCALHOST: &str = "localhost";

/// Capability set of a transfer
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Client for the cluster data is copied from
    fn source(&self) -> &Arc<dyn ClusterClient>;

    /// Client for the cluster data is copied to
    fn destination(&self) -> &Arc<dyn ClusterClient>;

    /// Endpoint the client side connects to
    fn endpoint(&self) -> &dyn Endpoint;

    /// Transport carrying the data
    fn transport(&self) -> &dyn Transport;

    /// Create the server side using `client`
    async fn create_server(&mut self, client: &dyn ClusterClient) -> Result<(), Error>;

    /// Create the client side using `client`
    async fn create_client(&mut self, client: &dyn ClusterClient) -> Result<(), Error>;

    /// Whether the server side is ready to accept connections
    async fn is_server_healthy(&self, client: &dyn ClusterClient) -> Result<bool, Error>;

    /// Claims this transfer migrates
    fn pvcs(&self) -> &PvcPairList;
}

/// Create the server side on the destination cluster
///
/// The kinds the server side needs are registered first; a registration
/// failure aborts before any cluster call.
#[instrument(skip(t))]
pub async fn create_server<T: Transfer + ?Sized>(t: &mut T) -> Result<(), Error> {
    let scheme = server_scheme()?;
    debug!(kinds = scheme.len(), "registered server kinds");

    let destination = Arc::clone(t.destination());
    t.create_server(destination.as_ref()).await
}

/// Tear down the server side
///
/// Generated objects carry the endpoint labels and are removed by the caller's
/// own garbage collection; nothing is deleted here.
pub async fn delete_server<T: Transfer + ?Sized>(_t: &mut T) -> Result<(), Error> {
    Ok(())
}

/// Create the client side on the source cluster
#[instrument(skip(t))]
pub async fn create_client<T: Transfer + ?Sized>(t: &mut T) -> Result<(), Error> {
    let source = Arc::clone(t.source());
    t.create_client(source.as_ref()).await
}

/// Tear down the client side
///
/// See [`delete_server`].
pub async fn delete_client<T: Transfer + ?Sized>(_t: &mut T) -> Result<(), Error> {
    Ok(())
}

/// Host the sync tool connects to
///
/// The endpoint itself for direct transports; otherwise the local tunnel.
pub fn connection_hostname<T: Transfer + ?Sized>(t: &T) -> String {
    if t.transport().direct() {
        t.endpoint().hostname().to_string()
    } else {
        LOCALHOST.to_string()
    }
}

/// Port the sync tool connects to
///
/// The endpoint's exposed port for direct transports; otherwise the tunnel port.
pub fn connection_port<T: Transfer + ?Sized>(t: &T) -> i32 {
    if t.transport().direct() {
        t.endpoint().exposed_port()
    } else {
        t.transport().port()
    }
}

/// A claim on the source cluster and the claim it is copied into
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PvcPair {
    source: ObjectKey,
    destination: ObjectKey,
}

impl PvcPair {
    /// Create a pair
    pub fn new(source: ObjectKey, destination: ObjectKey) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Claim being copied
    pub fn source(&self) -> &ObjectKey {
        &self.source
    }

    /// Claim receiving the copy
    pub fn destination(&self) -> &ObjectKey {
        &self.destination
    }
}

/// Ordered claims migrated by one transfer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PvcPairList(Vec<PvcPair>);

impl PvcPairList {
    /// Create a list from pairs
    pub fn new(pairs: Vec<PvcPair>) -> Self {
        Self(pairs)
    }

    /// Iterate pairs in order
    pub fn iter(&self) -> std::slice::Iter<'_, PvcPair> {
        self.0.iter()
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Namespaces the source claims live in, deduplicated and in order
    pub fn source_namespaces(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for pair in &self.0 {
            let ns = pair.source.namespace.as_str();
            if !seen.contains(&ns) {
                seen.push(ns);
            }
        }
        seen
    }

    /// Namespaces the destination claims live in, deduplicated and in order
    pub fn destination_namespaces(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for pair in &self.0 {
            let ns = pair.destination.namespace.as_str();
            if !seen.contains(&ns) {
                seen.push(ns);
            }
        }
        seen
    }
}

impl From<Vec<PvcPair>> for PvcPairList {
    fn from(pairs: Vec<PvcPair>) -> Self {
        Self(pairs)
    }
}

impl<'a> IntoIterator for &'a PvcPairList {
    type Item = &'a PvcPair;
    type IntoIter = std::slice::Iter<'a, PvcPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
