//! TLS tunnel transport backed by stunnel
//!
//! Each side gets a ConfigMap holding the rendered `stunnel.conf` and a Secret
//! holding the shared certificate and key. Reconciling is safe to repeat:
//!
//! - the ConfigMap is created, or replaced with the latest render if it exists
//! - the Secret is created once and never touched again, because replacing the
//!   key would break trust with the peer that already mounted the old one
//!
//! Both steps always run; their failures are reported together.

mod client;
mod server;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, KeyToPath, Secret,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{with_prefix, NamespacedNamePair, Transport};
use crate::client::{ClusterClient, ObjectKey};
use crate::config::{validate_config_value, TransportOptions};
use crate::endpoint::Endpoint;
use crate::pki::{TlsMaterial, DEFAULT_COMMON_NAME};
use crate::{Error, LABEL_MANAGED_BY, LABEL_MANAGED_BY_STATE_TRANSFER};

/// Name of the tunnel container on both sides
pub const STUNNEL_CONTAINER: &str = "stunnel";

/// Port the tunnel listens on locally when none is configured
pub const DEFAULT_TUNNEL_PORT: i32 = 2222;

/// Base name of the client ConfigMap (and its volume)
pub const DEFAULT_CLIENT_CONFIG: &str = "stunnel-client-config";

/// Base name of the client Secret (and its volume)
pub const DEFAULT_CLIENT_SECRET: &str = "stunnel-client-secret";

/// Base name of the server ConfigMap (and its volume)
pub const DEFAULT_SERVER_CONFIG: &str = "stunnel-server-config";

/// Base name of the server Secret (and its volume)
pub const DEFAULT_SERVER_SECRET: &str = "stunnel-server-secret";

/// ConfigMap key holding the rendered configuration
pub const CONFIG_KEY: &str = "stunnel.conf";

/// Secret key holding the PEM certificate
pub const TLS_CRT_KEY: &str = "tls.crt";

/// Secret key holding the PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";

const CONFIG_MOUNT_PATH: &str = "/etc/stunnel/stunnel.conf";
const CERTS_MOUNT_PATH: &str = "/etc/stunnel/certs";
const STUNNEL_BINARY: &str = "/bin/stunnel";

/// Which half of the tunnel is being provisioned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }

    fn config_name(self) -> &'static str {
        match self {
            Role::Client => DEFAULT_CLIENT_CONFIG,
            Role::Server => DEFAULT_SERVER_CONFIG,
        }
    }

    fn secret_name(self) -> &'static str {
        match self {
            Role::Client => DEFAULT_CLIENT_SECRET,
            Role::Server => DEFAULT_SERVER_SECRET,
        }
    }

    fn namespace(self, pair: &NamespacedNamePair) -> &str {
        match self {
            Role::Client => &pair.source().namespace,
            Role::Server => &pair.destination().namespace,
        }
    }

    fn image(self, options: &TransportOptions) -> &str {
        match self {
            Role::Client => options.client_image(),
            Role::Server => options.server_image(),
        }
    }
}

/// Values substituted into the stunnel templates
///
/// Holds the proxy password; never log it.
#[derive(Serialize)]
struct TunnelContext<'a> {
    accept_port: i32,
    connect_port: i32,
    hostname: &'a str,
    port: i32,
    proxy_host: &'a str,
    proxy_username: &'a str,
    proxy_password: &'a str,
    ca_verify_level: &'a str,
    no_verify_ca: bool,
}

impl<'a> TunnelContext<'a> {
    fn new(options: &'a TransportOptions, endpoint: &'a dyn Endpoint) -> Result<Self, Error> {
        validate_config_value("hostname", endpoint.hostname())?;
        Ok(Self {
            accept_port: 0,
            connect_port: 0,
            hostname: endpoint.hostname(),
            port: endpoint.exposed_port(),
            proxy_host: options.proxy_url.as_deref().unwrap_or_default(),
            proxy_username: options.proxy_username.as_deref().unwrap_or_default(),
            proxy_password: options.proxy_password.as_deref().unwrap_or_default(),
            ca_verify_level: options.effective_ca_verify_level(),
            no_verify_ca: options.no_verify_ca,
        })
    }
}

fn render(template_name: &str, source: &str, ctx: &TunnelContext<'_>) -> Result<String, Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template(template_name, source)
        .map_err(|e| Error::template(template_name, e))?;
    env.get_template(template_name)
        .and_then(|tmpl| tmpl.render(ctx))
        .map_err(|e| Error::template(template_name, e))
}

/// TLS tunnel transport
///
/// The certificate and key are fixed for the lifetime of the value and shared by
/// both sides.
pub struct StunnelTransport {
    material: TlsMaterial,
    ns_name_pair: NamespacedNamePair,
    options: TransportOptions,
    port: i32,
    client_containers: Vec<Container>,
    client_volumes: Vec<Volume>,
    server_containers: Vec<Container>,
    server_volumes: Vec<Volume>,
}

impl StunnelTransport {
    /// Create a transport with freshly generated TLS material
    pub fn new(ns_name_pair: NamespacedNamePair, options: TransportOptions) -> Result<Self, Error> {
        let material = TlsMaterial::generate(DEFAULT_COMMON_NAME)?;
        Self::with_material(ns_name_pair, options, material)
    }

    /// Create a transport around existing TLS material
    pub fn with_material(
        ns_name_pair: NamespacedNamePair,
        options: TransportOptions,
        material: TlsMaterial,
    ) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self {
            material,
            ns_name_pair,
            options,
            port: DEFAULT_TUNNEL_PORT,
            client_containers: Vec::new(),
            client_volumes: Vec::new(),
            server_containers: Vec::new(),
            server_volumes: Vec::new(),
        })
    }

    /// Listen on a different local port
    pub fn with_port(mut self, port: i32) -> Self {
        self.port = port;
        self
    }

    /// PEM certificate shared by both sides
    pub fn crt(&self) -> &[u8] {
        self.material.crt()
    }

    /// PEM private key shared by both sides
    pub fn key(&self) -> &[u8] {
        self.material.key()
    }

    /// Namespaces (and objects) this transport connects
    pub fn ns_name_pair(&self) -> &NamespacedNamePair {
        &self.ns_name_pair
    }

    fn config_key(&self, role: Role, prefix: &str) -> ObjectKey {
        ObjectKey::new(
            role.namespace(&self.ns_name_pair),
            with_prefix(prefix, role.config_name()),
        )
    }

    fn secret_key(&self, role: Role, prefix: &str) -> ObjectKey {
        ObjectKey::new(
            role.namespace(&self.ns_name_pair),
            with_prefix(prefix, role.secret_name()),
        )
    }

    fn config_map(
        &self,
        role: Role,
        prefix: &str,
        endpoint: &dyn Endpoint,
        conf: String,
    ) -> ConfigMap {
        let key = self.config_key(role, prefix);
        ConfigMap {
            metadata: object_meta(&key, endpoint.labels()),
            data: Some(BTreeMap::from([(CONFIG_KEY.to_string(), conf)])),
            ..Default::default()
        }
    }

    fn secret(&self, role: Role, prefix: &str, endpoint: &dyn Endpoint) -> Secret {
        let key = self.secret_key(role, prefix);
        Secret {
            metadata: object_meta(&key, endpoint.labels()),
            data: Some(BTreeMap::from([
                (TLS_CRT_KEY.to_string(), ByteString(self.crt().to_vec())),
                (TLS_KEY_KEY.to_string(), ByteString(self.key().to_vec())),
            ])),
            ..Default::default()
        }
    }

    /// Provision one side: ConfigMap, Secret, then the derived pod pieces
    #[instrument(
        skip(self, client, endpoint),
        fields(role = role.as_str(), namespace = %role.namespace(&self.ns_name_pair))
    )]
    async fn create_resources(
        &mut self,
        client: &dyn ClusterClient,
        role: Role,
        prefix: &str,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error> {
        let mut errors = Vec::new();

        let conf = match role {
            Role::Client => self.render_client_config(endpoint),
            Role::Server => self.render_server_config(endpoint),
        };
        match conf {
            Ok(conf) => {
                let config_map = self.config_map(role, prefix, endpoint, conf);
                if let Err(e) = ensure_config_map(client, &config_map).await {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }

        if let Err(e) = ensure_secret(client, &self.secret(role, prefix, endpoint)).await {
            errors.push(e);
        }

        let port = self.container_port(role, endpoint);
        let containers = tunnel_containers(role, role.image(&self.options), port);
        let volumes = tunnel_volumes(role, prefix);
        match role {
            Role::Client => {
                self.client_containers = containers;
                self.client_volumes = volumes;
            }
            Role::Server => {
                self.server_containers = containers;
                self.server_volumes = volumes;
            }
        }

        if errors.is_empty() {
            info!(prefix = %prefix, "stunnel resources reconciled");
        } else {
            warn!(prefix = %prefix, failures = errors.len(), "stunnel resources incomplete");
        }
        Error::aggregate(errors)
    }

    /// Port exposed by the tunnel container: the local listener on the client,
    /// the endpoint's backend port on the server
    fn container_port(&self, role: Role, endpoint: &dyn Endpoint) -> i32 {
        match role {
            Role::Client => self.port,
            Role::Server => endpoint.port(),
        }
    }
}

impl std::fmt::Debug for StunnelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StunnelTransport")
            .field("ns_name_pair", &self.ns_name_pair)
            .field("options", &self.options)
            .field("port", &self.port)
            .field("material", &self.material)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for StunnelTransport {
    fn options(&self) -> &TransportOptions {
        &self.options
    }

    fn direct(&self) -> bool {
        false
    }

    fn port(&self) -> i32 {
        self.port
    }

    fn destination_namespace(&self) -> Option<&str> {
        Some(Role::Server.namespace(&self.ns_name_pair))
    }

    fn client_containers(&self) -> &[Container] {
        &self.client_containers
    }

    fn client_volumes(&self) -> &[Volume] {
        &self.client_volumes
    }

    fn server_containers(&self) -> &[Container] {
        &self.server_containers
    }

    fn server_volumes(&self) -> &[Volume] {
        &self.server_volumes
    }

    async fn create_client(
        &mut self,
        client: &dyn ClusterClient,
        prefix: &str,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error> {
        self.create_resources(client, Role::Client, prefix, endpoint).await
    }

    async fn create_server(
        &mut self,
        client: &dyn ClusterClient,
        prefix: &str,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error> {
        self.create_resources(client, Role::Server, prefix, endpoint).await
    }
}

fn object_meta(key: &ObjectKey, labels: &BTreeMap<String, String>) -> ObjectMeta {
    let mut labels = labels.clone();
    labels.insert(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_STATE_TRANSFER.to_string(),
    );
    ObjectMeta {
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Create the ConfigMap, replacing it with the new content if it already exists
async fn ensure_config_map(
    client: &dyn ClusterClient,
    config_map: &ConfigMap,
) -> Result<(), Error> {
    match client.create_config_map(config_map).await {
        Ok(()) => {
            debug!(name = ?config_map.metadata.name, "created stunnel config");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            client.update_config_map(config_map).await?;
            debug!(name = ?config_map.metadata.name, "updated existing stunnel config");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Create the Secret unless it already exists; an existing one is left as is
async fn ensure_secret(client: &dyn ClusterClient, secret: &Secret) -> Result<(), Error> {
    match client.create_secret(secret).await {
        Ok(()) => {
            debug!(name = ?secret.metadata.name, "created stunnel secret");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            debug!(name = ?secret.metadata.name, "stunnel secret already exists, keeping it");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn tunnel_containers(role: Role, image: &str, port: i32) -> Vec<Container> {
    vec![Container {
        name: STUNNEL_CONTAINER.to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            STUNNEL_BINARY.to_string(),
            CONFIG_MOUNT_PATH.to_string(),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some(STUNNEL_CONTAINER.to_string()),
            protocol: Some("TCP".to_string()),
            container_port: port,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: role.config_name().to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                sub_path: Some(CONFIG_KEY.to_string()),
                ..Default::default()
            },
            VolumeMount {
                name: role.secret_name().to_string(),
                mount_path: CERTS_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }]
}

fn tunnel_volumes(role: Role, prefix: &str) -> Vec<Volume> {
    vec![
        Volume {
            name: role.config_name().to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: with_prefix(prefix, role.config_name()),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: role.secret_name().to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(with_prefix(prefix, role.secret_name())),
                items: Some(vec![
                    KeyToPath {
                        key: TLS_CRT_KEY.to_string(),
                        path: TLS_CRT_KEY.to_string(),
                        ..Default::default()
                    },
                    KeyToPath {
                        key: TLS_KEY_KEY.to_string(),
                        path: TLS_KEY_KEY.to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}
