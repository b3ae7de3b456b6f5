//! Transfer of a list of claims over one transport

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::health::are_filtered_pods_healthy;
use super::{PvcPairList, Transfer};
use crate::client::ClusterClient;
use crate::endpoint::Endpoint;
use crate::transport::Transport;
use crate::Error;

/// Transfer that provisions its transport under one name prefix
///
/// All destination claims share one namespace. The server side runs there, so
/// server pods are found through the endpoint labels in that namespace.
pub struct PvcTransfer {
    prefix: String,
    server_namespace: String,
    transport: Box<dyn Transport>,
    endpoint: Box<dyn Endpoint>,
    source: Arc<dyn ClusterClient>,
    destination: Arc<dyn ClusterClient>,
    pvcs: PvcPairList,
}

impl PvcTransfer {
    /// Compose a transfer
    ///
    /// Fails unless the destination claims live in exactly one namespace and
    /// that namespace is the one the transport writes server objects to.
    pub fn new(
        prefix: impl Into<String>,
        transport: Box<dyn Transport>,
        endpoint: Box<dyn Endpoint>,
        source: Arc<dyn ClusterClient>,
        destination: Arc<dyn ClusterClient>,
        pvcs: PvcPairList,
    ) -> Result<Self, Error> {
        let server_namespace = match pvcs.destination_namespaces().as_slice() {
            [] => return Err(Error::validation("transfer has no destination claims")),
            [ns] => ns.to_string(),
            many => {
                return Err(Error::validation(format!(
                    "destination claims span namespaces {:?}, expected one",
                    many
                )))
            }
        };

        if let Some(ns) = transport.destination_namespace() {
            if ns != server_namespace {
                return Err(Error::validation(format!(
                    "transport writes server objects to {} but destination claims are in {}",
                    ns, server_namespace
                )));
            }
        }

        Ok(Self {
            prefix: prefix.into(),
            server_namespace,
            transport,
            endpoint,
            source,
            destination,
            pvcs,
        })
    }

    /// Prefix of every generated object name
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Namespace the server side runs in
    pub fn server_namespace(&self) -> &str {
        &self.server_namespace
    }
}

#[async_trait]
impl Transfer for PvcTransfer {
    fn source(&self) -> &Arc<dyn ClusterClient> {
        &self.source
    }

    fn destination(&self) -> &Arc<dyn ClusterClient> {
        &self.destination
    }

    fn endpoint(&self) -> &dyn Endpoint {
        self.endpoint.as_ref()
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    async fn create_server(&mut self, client: &dyn ClusterClient) -> Result<(), Error> {
        self.transport
            .create_server(client, &self.prefix, self.endpoint.as_ref())
            .await?;
        info!(prefix = %self.prefix, pvcs = self.pvcs.len(), "transfer server provisioned");
        Ok(())
    }

    async fn create_client(&mut self, client: &dyn ClusterClient) -> Result<(), Error> {
        self.transport
            .create_client(client, &self.prefix, self.endpoint.as_ref())
            .await?;
        info!(prefix = %self.prefix, pvcs = self.pvcs.len(), "transfer client provisioned");
        Ok(())
    }

    async fn is_server_healthy(&self, client: &dyn ClusterClient) -> Result<bool, Error> {
        are_filtered_pods_healthy(client, &self.server_namespace, self.endpoint.labels()).await
    }

    fn pvcs(&self) -> &PvcPairList {
        &self.pvcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockClusterClient, ObjectKey};
    use crate::config::TransportOptions;
    use crate::endpoint::ResolvedEndpoint;
    use crate::transfer::{
        connection_hostname, connection_port, create_client, create_server, delete_client,
        delete_server, PvcPair, LOCALHOST,
    };
    use crate::transport::{NamespacedNamePair, NullTransport, StunnelTransport};

    fn pvcs() -> PvcPairList {
        PvcPairList::new(vec![PvcPair::new(
            ObjectKey::new("src", "data"),
            ObjectKey::new("dst", "data"),
        )])
    }

    fn endpoint() -> Box<dyn Endpoint> {
        Box::new(
            ResolvedEndpoint::new("rsync.apps.dest.example.com", 6443, 443)
                .with_label("app", "rsync-server"),
        )
    }

    fn stunnel_to(destination_ns: &str) -> Box<dyn Transport> {
        let pair = NamespacedNamePair::new(
            ObjectKey::new("src", "data"),
            ObjectKey::new(destination_ns, "data"),
        );
        Box::new(StunnelTransport::new(pair, TransportOptions::default()).expect("transport"))
    }

    fn stunnel() -> Box<dyn Transport> {
        stunnel_to("dst")
    }

    fn idle_client() -> Arc<dyn ClusterClient> {
        Arc::new(MockClusterClient::new())
    }

    fn accepting_client(namespace: &'static str) -> Arc<dyn ClusterClient> {
        let mut client = MockClusterClient::new();
        client
            .expect_create_config_map()
            .withf(move |cm| cm.metadata.namespace.as_deref() == Some(namespace))
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_create_secret()
            .withf(move |s| s.metadata.namespace.as_deref() == Some(namespace))
            .times(1)
            .returning(|_| Ok(()));
        Arc::new(client)
    }

    fn transfer(transport: Box<dyn Transport>, pvcs: PvcPairList) -> Result<PvcTransfer, Error> {
        PvcTransfer::new("data", transport, endpoint(), idle_client(), idle_client(), pvcs)
    }

    /// Story: the server half goes to the destination cluster and the client
    /// half to the source cluster, never the other way around
    #[tokio::test]
    async fn story_each_half_lands_on_its_own_cluster() {
        let mut transfer = PvcTransfer::new(
            "data",
            stunnel(),
            endpoint(),
            accepting_client("src"),
            accepting_client("dst"),
            pvcs(),
        )
        .expect("transfer");

        create_server(&mut transfer).await.expect("server");
        create_client(&mut transfer).await.expect("client");

        assert_eq!(transfer.transport().server_containers().len(), 1);
        assert_eq!(transfer.transport().client_containers().len(), 1);
    }

    #[tokio::test]
    async fn test_tunnelled_transfer_connects_locally() {
        let transfer = transfer(stunnel(), pvcs()).expect("transfer");
        assert_eq!(connection_hostname(&transfer), LOCALHOST);
        assert_eq!(connection_port(&transfer), 2222);
    }

    #[tokio::test]
    async fn test_direct_transfer_connects_to_endpoint() {
        let transfer = transfer(Box::new(NullTransport::default()), pvcs()).expect("transfer");
        assert_eq!(connection_hostname(&transfer), "rsync.apps.dest.example.com");
        assert_eq!(connection_port(&transfer), 443);
    }

    #[tokio::test]
    async fn test_delete_is_a_noop() {
        let mut transfer = transfer(stunnel(), pvcs()).expect("transfer");
        delete_server(&mut transfer).await.expect("noop");
        delete_client(&mut transfer).await.expect("noop");
    }

    #[tokio::test]
    async fn test_server_health_selects_by_endpoint_labels() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_pods()
            .withf(|ns, labels| {
                ns == "dst" && labels.get("app").map(String::as_str) == Some("rsync-server")
            })
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let transfer = transfer(stunnel(), pvcs()).expect("transfer");
        assert_eq!(transfer.server_namespace(), "dst");
        let healthy = transfer
            .is_server_healthy(&client)
            .await
            .expect("no pods is not an error");
        assert!(!healthy);
    }

    #[test]
    fn test_transfer_without_claims_is_invalid() {
        let err = transfer(stunnel(), PvcPairList::default()).err();
        assert!(matches!(err, Some(Error::Validation { .. })));
    }

    /// Story: the tunnel's server objects and the health probe must look at
    /// the same namespace, so a transport aimed elsewhere is refused
    #[test]
    fn story_transport_and_claims_must_agree_on_namespace() {
        let err = transfer(stunnel_to("elsewhere"), pvcs()).err();
        match err {
            Some(Error::Validation { message, .. }) => {
                assert!(message.contains("elsewhere"));
                assert!(message.contains("dst"));
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_claims_spanning_namespaces_are_invalid() {
        let pvcs = PvcPairList::new(vec![
            PvcPair::new(ObjectKey::new("src", "a"), ObjectKey::new("dst", "a")),
            PvcPair::new(ObjectKey::new("src", "b"), ObjectKey::new("other", "b")),
        ]);
        let err = transfer(Box::new(NullTransport::default()), pvcs).err();
        assert!(matches!(err, Some(Error::Validation { .. })));
    }

    #[test]
    fn test_direct_transport_takes_claim_namespace() {
        let transfer = transfer(Box::new(NullTransport::default()), pvcs()).expect("transfer");
        assert_eq!(transfer.server_namespace(), "dst");
    }
}
