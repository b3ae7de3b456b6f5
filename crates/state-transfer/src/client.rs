//! Cluster CRUD client
//!
//! Everything in this crate talks to a cluster through [`ClusterClient`], which
//! keeps the orchestration code testable without an API server. The
//! [`KubeClusterClient`] implementation wraps a kube-rs [`Client`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::{Api, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource, ResourceExt};
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use crate::config::ClientConfig;
use crate::Error;

/// Namespace and name identifying a namespaced object
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a new key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object, empty parts where metadata is missing
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Trait abstracting the Kubernetes operations transfers need
///
/// Errors from the API server are returned as [`Error::Kube`] unchanged so that
/// callers can branch on [`Error::is_already_exists`] and [`Error::is_not_found`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a ConfigMap
    async fn get_config_map(&self, key: &ObjectKey) -> Result<ConfigMap, Error>;

    /// Create a ConfigMap in the namespace named by its metadata
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), Error>;

    /// Replace an existing ConfigMap
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<(), Error>;

    /// Get a Secret
    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret, Error>;

    /// Create a Secret in the namespace named by its metadata
    async fn create_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Get a Pod
    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod, Error>;

    /// List Pods in a namespace matching every label in `labels`
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error>;
}

/// Render a label map as a Kubernetes equality-based selector (`a=b,c=d`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String, Error> {
    obj.namespace().ok_or_else(|| {
        Error::validation_for_field(
            "metadata.namespace",
            format!("object {} has no namespace", obj.name_any()),
        )
    })
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig path, or infer one from the environment
    pub async fn connect(config: &ClientConfig) -> Result<Self, Error> {
        let mut kube_config = match &config.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::internal_with_context(
                        "connect",
                        format!("failed to read kubeconfig {}: {}", path.display(), e),
                    )
                })?;
                let options = KubeConfigOptions {
                    context: config.context.clone(),
                    ..Default::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| {
                        Error::internal_with_context(
                            "connect",
                            format!("failed to load kubeconfig: {}", e),
                        )
                    })?
            }
            None => Config::infer().await.map_err(|e| {
                Error::internal_with_context("connect", format!("failed to infer config: {}", e))
            })?,
        };
        kube_config.connect_timeout = Some(config.connect_timeout);
        kube_config.read_timeout = Some(config.read_timeout);

        let client = Client::try_from(kube_config).map_err(|e| {
            Error::internal_with_context("connect", format!("failed to create client: {}", e))
        })?;
        Ok(Self::new(client))
    }

    /// Get the underlying kube Client
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_config_map(&self, key: &ObjectKey) -> Result<ConfigMap, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get(&key.name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace_of(config_map)?);
        api.create(&PostParams::default(), config_map).await?;
        debug!(name = %config_map.name_any(), "created configmap");
        Ok(())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace_of(config_map)?);
        api.replace(&config_map.name_any(), &PostParams::default(), config_map)
            .await?;
        debug!(name = %config_map.name_any(), "replaced configmap");
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get(&key.name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace_of(secret)?);
        api.create(&PostParams::default(), secret).await?;
        debug!(name = %secret.name_any(), "created secret");
        Ok(())
    }

    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get(&key.name).await?)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector = label_selector(labels);
        trace!(namespace = %namespace, selector = %selector, "listing pods");
        let pods = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(pods.items)
    }
}
