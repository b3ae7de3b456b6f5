//! Pass-through transport
//!
//! Used when the endpoint is already secured (or doesn't need to be). Nothing is
//! created on either cluster and the sync tool connects to the endpoint itself.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Volume};
use tracing::debug;

use super::Transport;
use crate::client::ClusterClient;
use crate::config::TransportOptions;
use crate::endpoint::Endpoint;
use crate::Error;

/// Transport that adds no tunnel
#[derive(Clone, Debug, Default)]
pub struct NullTransport {
    options: TransportOptions,
}

impl NullTransport {
    /// Create a pass-through transport
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn options(&self) -> &TransportOptions {
        &self.options
    }

    fn direct(&self) -> bool {
        true
    }

    fn port(&self) -> i32 {
        0
    }

    fn client_containers(&self) -> &[Container] {
        &[]
    }

    fn client_volumes(&self) -> &[Volume] {
        &[]
    }

    fn server_containers(&self) -> &[Container] {
        &[]
    }

    fn server_volumes(&self) -> &[Volume] {
        &[]
    }

    async fn create_client(
        &mut self,
        _client: &dyn ClusterClient,
        prefix: &str,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error> {
        debug!(
            prefix = %prefix,
            hostname = %endpoint.hostname(),
            "direct transport, no client resources"
        );
        Ok(())
    }

    async fn create_server(
        &mut self,
        _client: &dyn ClusterClient,
        prefix: &str,
        _endpoint: &dyn Endpoint,
    ) -> Result<(), Error> {
        debug!(prefix = %prefix, "direct transport, no server resources");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterClient;
    use crate::endpoint::ResolvedEndpoint;

    /// Story: a direct transport never touches either cluster
    #[tokio::test]
    async fn story_direct_transport_creates_nothing() {
        // No expectations: any call on the mock panics
        let client = MockClusterClient::new();
        let endpoint = ResolvedEndpoint::new("rsync.apps.example.com", 6443, 443);
        let mut transport = NullTransport::default();

        transport
            .create_client(&client, "data", &endpoint)
            .await
            .expect("create_client should succeed");
        transport
            .create_server(&client, "data", &endpoint)
            .await
            .expect("create_server should succeed");

        assert!(transport.direct());
        assert!(transport.client_containers().is_empty());
        assert!(transport.server_volumes().is_empty());
    }
}
