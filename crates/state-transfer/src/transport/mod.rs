//! Transports: how the two sides of a transfer reach each other
//!
//! A transport knows which objects each side needs (config, TLS material) and
//! which containers and volumes a later pod-assembly step must add. Direct
//! transports pass traffic unmodified; tunnelled transports terminate locally
//! and forward to the peer.

pub mod null;
pub mod stunnel;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Volume};

use crate::client::{ClusterClient, ObjectKey};
use crate::config::TransportOptions;
use crate::endpoint::Endpoint;
use crate::Error;

pub use null::NullTransport;
pub use stunnel::StunnelTransport;

/// Capability set shared by every transport variant
#[async_trait]
pub trait Transport: Send + Sync {
    /// Options the transport was built with
    fn options(&self) -> &TransportOptions;

    /// Whether traffic bypasses a local tunnel
    fn direct(&self) -> bool;

    /// Local port the tunnel listens on
    fn port(&self) -> i32;

    /// Namespace the server side objects are written to, if the transport
    /// writes any
    fn destination_namespace(&self) -> Option<&str> {
        None
    }

    /// Containers the client pod must run, set by `create_client`
    fn client_containers(&self) -> &[Container];

    /// Volumes the client pod must mount, set by `create_client`
    fn client_volumes(&self) -> &[Volume];

    /// Containers the server pod must run, set by `create_server`
    fn server_containers(&self) -> &[Container];

    /// Volumes the server pod must mount, set by `create_server`
    fn server_volumes(&self) -> &[Volume];

    /// Provision the client side in the source namespace
    async fn create_client(
        &mut self,
        client: &dyn ClusterClient,
        prefix: &str,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error>;

    /// Provision the server side in the destination namespace
    async fn create_server(
        &mut self,
        client: &dyn ClusterClient,
        prefix: &str,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error>;
}

/// Source and destination object a transport connects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespacedNamePair {
    /// Object on the source cluster
    pub source: ObjectKey,
    /// Object on the destination cluster
    pub destination: ObjectKey,
}

impl NamespacedNamePair {
    /// Create a pair
    pub fn new(source: ObjectKey, destination: ObjectKey) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Source object
    pub fn source(&self) -> &ObjectKey {
        &self.source
    }

    /// Destination object
    pub fn destination(&self) -> &ObjectKey {
        &self.destination
    }
}

/// Name of a generated object: `<prefix>-<name>`
pub fn with_prefix(prefix: &str, name: &str) -> String {
    format!("{}-{}", prefix, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_prefix() {
        assert_eq!(
            with_prefix("pvc-data", "stunnel-client-config"),
            "pvc-data-stunnel-client-config"
        );
    }

    #[test]
    fn test_pair_accessors() {
        let pair = NamespacedNamePair::new(
            ObjectKey::new("src-ns", "data"),
            ObjectKey::new("dst-ns", "data-copy"),
        );
        assert_eq!(pair.source().namespace, "src-ns");
        assert_eq!(pair.destination().name, "data-copy");
    }
}
