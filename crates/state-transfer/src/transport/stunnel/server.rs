//! Server side of the stunnel transport
//!
//! The server tunnel accepts TLS on the endpoint's backend port and forwards
//! plaintext to the sync daemon listening on the transport port in the same pod.

use k8s_openapi::api::core::v1::{ConfigMap, Secret};

use super::{render, Role, StunnelTransport, TunnelContext};
use crate::client::ClusterClient;
use crate::endpoint::Endpoint;
use crate::Error;

const SERVER_TEMPLATE_NAME: &str = "stunnel-server.conf";

const SERVER_TEMPLATE: &str = r#"pid =
sslVersion = TLSv1.2
syslog = no
output = /dev/stdout
[rsync]
debug = 7
accept = {{ accept_port }}
connect = {{ connect_port }}
cert = /etc/stunnel/certs/tls.crt
key = /etc/stunnel/certs/tls.key
TIMEOUTclose = 0
{% if not no_verify_ca %}
verify = {{ ca_verify_level }}
{% endif %}
"#;

impl StunnelTransport {
    /// Render the server `stunnel.conf` for an endpoint
    pub fn render_server_config(&self, endpoint: &dyn Endpoint) -> Result<String, Error> {
        let ctx = TunnelContext {
            accept_port: endpoint.port(),
            connect_port: self.port,
            ..TunnelContext::new(&self.options, endpoint)?
        };
        render(SERVER_TEMPLATE_NAME, SERVER_TEMPLATE, &ctx)
    }

    /// Fetch the server ConfigMap created by `create_server`
    pub async fn get_server_config(
        &self,
        client: &dyn ClusterClient,
        prefix: &str,
    ) -> Result<ConfigMap, Error> {
        client
            .get_config_map(&self.config_key(Role::Server, prefix))
            .await
    }

    /// Fetch the server Secret created by `create_server`
    pub async fn get_server_secret(
        &self,
        client: &dyn ClusterClient,
        prefix: &str,
    ) -> Result<Secret, Error> {
        client
            .get_secret(&self.secret_key(Role::Server, prefix))
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::client::{MockClusterClient, ObjectKey};
    use crate::config::TransportOptions;
    use crate::endpoint::ResolvedEndpoint;
    use crate::error::test_support::not_found;
    use crate::pki::TlsMaterial;
    use crate::transport::stunnel::StunnelTransport;
    use crate::transport::NamespacedNamePair;

    fn transport(options: TransportOptions) -> StunnelTransport {
        let material = TlsMaterial::generate("test").expect("material");
        let pair = NamespacedNamePair::new(
            ObjectKey::new("src", "data"),
            ObjectKey::new("dst", "data"),
        );
        StunnelTransport::with_material(pair, options, material).expect("options should be valid")
    }

    #[test]
    fn test_default_render() {
        let endpoint = ResolvedEndpoint::new("rsync.apps.dest.example.com", 6443, 443);
        let conf = transport(TransportOptions::default())
            .render_server_config(&endpoint)
            .expect("render");
        assert_eq!(
            conf.lines().collect::<Vec<_>>(),
            vec![
                "pid =",
                "sslVersion = TLSv1.2",
                "syslog = no",
                "output = /dev/stdout",
                "[rsync]",
                "debug = 7",
                "accept = 6443",
                "connect = 2222",
                "cert = /etc/stunnel/certs/tls.crt",
                "key = /etc/stunnel/certs/tls.key",
                "TIMEOUTclose = 0",
                "verify = 2",
            ]
        );
    }

    /// Story: the proxy only matters for the side dialing out; the server
    /// config must not leak proxy credentials
    #[test]
    fn story_server_ignores_proxy() {
        let endpoint = ResolvedEndpoint::new("rsync.apps.dest.example.com", 6443, 443);
        let conf = transport(TransportOptions {
            proxy_url: Some("proxy.corp:3128".to_string()),
            proxy_password: Some("hunter2".to_string()),
            ..Default::default()
        })
        .render_server_config(&endpoint)
        .expect("render");
        assert!(!conf.contains("client = yes"));
        assert!(!conf.contains("protocol"));
        assert!(!conf.contains("hunter2"));
    }

    #[test]
    fn test_no_verify_ca() {
        let endpoint = ResolvedEndpoint::new("h", 1, 2);
        let conf = transport(TransportOptions {
            no_verify_ca: true,
            ..Default::default()
        })
        .render_server_config(&endpoint)
        .expect("render");
        assert!(!conf.contains("verify"));
    }

    #[tokio::test]
    async fn test_get_server_config_propagates_not_found() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_config_map()
            .withf(|key| *key == ObjectKey::new("dst", "data-stunnel-server-config"))
            .returning(|_| Err(not_found("configmaps", "data-stunnel-server-config").into()));
        client
            .expect_get_secret()
            .withf(|key| *key == ObjectKey::new("dst", "data-stunnel-server-secret"))
            .returning(|_| Ok(Default::default()));

        let transport = transport(TransportOptions::default());
        let err = transport
            .get_server_config(&client, "data")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(transport.get_server_secret(&client, "data").await.is_ok());
    }
}
