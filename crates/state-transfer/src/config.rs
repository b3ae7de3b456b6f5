//! Transport options and cluster client configuration
//!
//! [`TransportOptions`] is deserializable (camelCase, like the CRD specs that
//! usually embed it) and immutable once handed to a transport. Proxy credentials
//! are redacted from its `Debug` output so options can be logged safely.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// CA verification level used when none is configured
pub const DEFAULT_CA_VERIFY_LEVEL: &str = "2";

/// Image carrying both the stunnel binary and the sync tool
pub const DEFAULT_TRANSFER_IMAGE: &str = "quay.io/konveyor/rsync-transfer:latest";

/// Environment variable overriding the transfer image for both sides
pub const TRANSFER_IMAGE_ENV: &str = "STUNNEL_TRANSFER_IMAGE";

/// Default connection timeout for cluster clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read timeout for cluster clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

const REDACTED: &str = "<redacted>";

/// Options shaping how a transport authenticates and reaches its peer
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportOptions {
    /// stunnel `verify` level; empty means [`DEFAULT_CA_VERIFY_LEVEL`]
    #[serde(rename = "caVerifyLevel")]
    pub ca_verify_level: String,
    /// HTTP CONNECT proxy (`host:port`) the client tunnels through
    #[serde(rename = "proxyURL", skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Proxy username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_username: Option<String>,
    /// Proxy password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_password: Option<String>,
    /// Skip peer certificate verification entirely
    #[serde(rename = "noVerifyCA")]
    pub no_verify_ca: bool,
    /// Image for the client-side tunnel container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stunnel_client_image: Option<String>,
    /// Image for the server-side tunnel container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stunnel_server_image: Option<String>,
}

impl TransportOptions {
    /// Parse options from YAML (or JSON, which is valid YAML)
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let options: Self = serde_yaml::from_str(input)
            .map_err(|e| Error::validation(format!("invalid transport options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject values stunnel would refuse at startup
    pub fn validate(&self) -> Result<(), Error> {
        let level = &self.ca_verify_level;
        if !level.is_empty() && !matches!(level.as_str(), "0" | "1" | "2" | "3" | "4") {
            return Err(Error::validation_for_field(
                "caVerifyLevel",
                format!("unsupported CA verify level {:?}, expected 0-4", level),
            ));
        }
        for (field, value) in [
            ("proxyURL", &self.proxy_url),
            ("proxyUsername", &self.proxy_username),
            ("proxyPassword", &self.proxy_password),
        ] {
            if let Some(value) = value {
                validate_config_value(field, value)?;
            }
        }
        Ok(())
    }

    /// CA verify level with the default applied
    pub fn effective_ca_verify_level(&self) -> &str {
        if self.ca_verify_level.is_empty() {
            DEFAULT_CA_VERIFY_LEVEL
        } else {
            &self.ca_verify_level
        }
    }

    /// Image for the client-side container
    pub fn client_image(&self) -> &str {
        self.stunnel_client_image
            .as_deref()
            .unwrap_or(DEFAULT_TRANSFER_IMAGE)
    }

    /// Image for the server-side container
    pub fn server_image(&self) -> &str {
        self.stunnel_server_image
            .as_deref()
            .unwrap_or(DEFAULT_TRANSFER_IMAGE)
    }

    /// Fill unset images from the environment
    ///
    /// Explicitly configured images win over the environment.
    pub fn with_env_overrides(mut self, env: &dyn EnvConfig) -> Self {
        if let Some(image) = env.transfer_image() {
            if self.stunnel_client_image.is_none() {
                self.stunnel_client_image = Some(image.clone());
            }
            if self.stunnel_server_image.is_none() {
                self.stunnel_server_image = Some(image);
            }
        }
        self
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("ca_verify_level", &self.ca_verify_level)
            .field("proxy_url", &self.proxy_url)
            .field("proxy_username", &self.proxy_username.as_ref().map(|_| REDACTED))
            .field("proxy_password", &self.proxy_password.as_ref().map(|_| REDACTED))
            .field("no_verify_ca", &self.no_verify_ca)
            .field("stunnel_client_image", &self.stunnel_client_image)
            .field("stunnel_server_image", &self.stunnel_server_image)
            .finish()
    }
}

/// Reject a value that would be written into the line-oriented stunnel config
///
/// CR, LF and every other control character are refused; the error names the
/// field but never echoes the value, which may be a credential.
pub fn validate_config_value(field: &str, value: &str) -> Result<(), Error> {
    if value.chars().any(char::is_control) {
        return Err(Error::validation_for_field(
            field,
            format!("{} must not contain control characters", field),
        ));
    }
    Ok(())
}

/// Trait for reading transfer settings from the environment
///
/// Keeps tests independent of process-global state.
#[cfg_attr(test, mockall::automock)]
pub trait EnvConfig: Send + Sync {
    /// Image override for the tunnel containers
    fn transfer_image(&self) -> Option<String>;
}

/// Default implementation that reads from environment variables
#[derive(Clone, Default)]
pub struct OsEnvConfig;

impl EnvConfig for OsEnvConfig {
    fn transfer_image(&self) -> Option<String> {
        std::env::var(TRANSFER_IMAGE_ENV)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// How to reach one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Kubeconfig file; `None` infers in-cluster or default config
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one
    pub context: Option<String>,
    /// TCP connect timeout for API requests
    pub connect_timeout: Duration,
    /// Read timeout for API requests
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Config for the given kubeconfig file
    pub fn from_kubeconfig(path: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig: Some(path.into()),
            ..Default::default()
        }
    }

    /// Use a specific kubeconfig context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_verify_level() {
        let options = TransportOptions::default();
        assert_eq!(options.effective_ca_verify_level(), "2");

        let options = TransportOptions {
            ca_verify_level: "0".to_string(),
            ..Default::default()
        };
        assert_eq!(options.effective_ca_verify_level(), "0");
    }

    #[test]
    fn test_from_yaml_uses_wire_names() {
        let options = TransportOptions::from_yaml(
            r#"
caVerifyLevel: "3"
proxyURL: proxy.corp:3128
proxyUsername: alice
proxyPassword: hunter2
noVerifyCA: true
stunnelClientImage: registry.local/stunnel:v1
"#,
        )
        .expect("options should parse");

        assert_eq!(options.ca_verify_level, "3");
        assert_eq!(options.proxy_url.as_deref(), Some("proxy.corp:3128"));
        assert_eq!(options.proxy_username.as_deref(), Some("alice"));
        assert_eq!(options.proxy_password.as_deref(), Some("hunter2"));
        assert!(options.no_verify_ca);
        assert_eq!(options.client_image(), "registry.local/stunnel:v1");
        assert_eq!(options.server_image(), DEFAULT_TRANSFER_IMAGE);
    }

    #[test]
    fn test_from_yaml_empty_document_is_default() {
        let options = TransportOptions::from_yaml("{}").expect("empty options should parse");
        assert_eq!(options, TransportOptions::default());
    }

    #[test]
    fn test_invalid_verify_level_rejected() {
        let err = TransportOptions::from_yaml("caVerifyLevel: strict").unwrap_err();
        match err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("caVerifyLevel")),
            other => panic!("Expected Validation variant, got {other:?}"),
        }
    }

    /// Story: a newline smuggled into a proxy setting would append directives
    /// to stunnel.conf (for example `verify = 0`), so it is refused up front
    #[test]
    fn story_control_characters_in_proxy_settings_rejected() {
        for (field, options) in [
            (
                "proxyURL",
                TransportOptions {
                    proxy_url: Some("p:3128\nverify = 0".to_string()),
                    ..Default::default()
                },
            ),
            (
                "proxyUsername",
                TransportOptions {
                    proxy_username: Some("alice\r\nverify = 0".to_string()),
                    ..Default::default()
                },
            ),
            (
                "proxyPassword",
                TransportOptions {
                    proxy_password: Some("hunter2\u{0}".to_string()),
                    ..Default::default()
                },
            ),
        ] {
            match options.validate().unwrap_err() {
                Error::Validation { field: f, message } => {
                    assert_eq!(f.as_deref(), Some(field));
                    assert!(!message.contains("verify = 0"));
                    assert!(!message.contains("hunter2"));
                }
                other => panic!("Expected Validation variant, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_plain_proxy_settings_accepted() {
        let options = TransportOptions {
            proxy_url: Some("proxy.corp:3128".to_string()),
            proxy_username: Some("alice".to_string()),
            proxy_password: Some("p@ss word!".to_string()),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_escaped_newline_rejected() {
        let err = TransportOptions::from_yaml("proxyURL: \"p:3128\\nverify = 0\"").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    /// Story: operators log transport options while debugging connectivity;
    /// the proxy credentials must never end up in those logs.
    #[test]
    fn story_debug_output_redacts_proxy_credentials() {
        let options = TransportOptions {
            proxy_url: Some("proxy.corp:3128".to_string()),
            proxy_username: Some("alice".to_string()),
            proxy_password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", options);
        assert!(rendered.contains("proxy.corp:3128"));
        assert!(!rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn test_env_override_fills_unset_images() {
        let mut env = MockEnvConfig::new();
        env.expect_transfer_image()
            .returning(|| Some("mirror.local/rsync-transfer:1.0".to_string()));

        let options = TransportOptions {
            stunnel_server_image: Some("pinned/server:2".to_string()),
            ..Default::default()
        }
        .with_env_overrides(&env);

        assert_eq!(options.client_image(), "mirror.local/rsync-transfer:1.0");
        assert_eq!(options.server_image(), "pinned/server:2");
    }

    #[test]
    fn test_env_override_absent() {
        let mut env = MockEnvConfig::new();
        env.expect_transfer_image().returning(|| None);

        let options = TransportOptions::default().with_env_overrides(&env);
        assert_eq!(options.client_image(), DEFAULT_TRANSFER_IMAGE);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::from_kubeconfig("/tmp/source.kubeconfig").with_context("src");
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.context.as_deref(), Some("src"));
        assert!(ClientConfig::default().kubeconfig.is_none());
    }
}
