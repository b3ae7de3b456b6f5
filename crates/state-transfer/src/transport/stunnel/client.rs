//! Client side of the stunnel transport
//!
//! The client tunnel listens locally on the transport port and connects out to
//! the endpoint, optionally through an HTTP CONNECT proxy.

use k8s_openapi::api::core::v1::{ConfigMap, Secret};

use super::{render, Role, StunnelTransport, TunnelContext};
use crate::client::ClusterClient;
use crate::endpoint::Endpoint;
use crate::Error;

const CLIENT_TEMPLATE_NAME: &str = "stunnel-client.conf";

const CLIENT_TEMPLATE: &str = r#"pid =
sslVersion = TLSv1.2
client = yes
syslog = no
output = /dev/stdout
[rsync]
debug = 7
accept = {{ accept_port }}
cert = /etc/stunnel/certs/tls.crt
key = /etc/stunnel/certs/tls.key
{% if proxy_host %}
protocol = connect
connect = {{ proxy_host }}
protocolHost = {{ hostname }}:{{ port }}
{% if proxy_username %}
protocolUsername = {{ proxy_username }}
{% endif %}
{% if proxy_password %}
protocolPassword = {{ proxy_password }}
{% endif %}
{% else %}
connect = {{ hostname }}:{{ port }}
{% endif %}
{% if not no_verify_ca %}
verify = {{ ca_verify_level }}
{% endif %}
"#;

impl StunnelTransport {
    /// Render the client `stunnel.conf` for an endpoint
    ///
    /// The result may contain proxy credentials.
    pub fn render_client_config(&self, endpoint: &dyn Endpoint) -> Result<String, Error> {
        let ctx = TunnelContext {
            accept_port: self.port,
            ..TunnelContext::new(&self.options, endpoint)?
        };
        render(CLIENT_TEMPLATE_NAME, CLIENT_TEMPLATE, &ctx)
    }

    /// Fetch the client ConfigMap created by `create_client`
    pub async fn get_client_config(
        &self,
        client: &dyn ClusterClient,
        prefix: &str,
    ) -> Result<ConfigMap, Error> {
        client
            .get_config_map(&self.config_key(Role::Client, prefix))
            .await
    }

    /// Fetch the client Secret created by `create_client`
    pub async fn get_client_secret(
        &self,
        client: &dyn ClusterClient,
        prefix: &str,
    ) -> Result<Secret, Error> {
        client
            .get_secret(&self.secret_key(Role::Client, prefix))
            .await
    }
}
