//! Network endpoint a transport connects to
//!
//! Endpoints are provisioned elsewhere (Route, LoadBalancer Service, ...); this
//! crate only reads them.

use std::collections::BTreeMap;

/// Externally provisioned, reachable address of the server side
pub trait Endpoint: Send + Sync {
    /// Hostname clients connect to
    fn hostname(&self) -> &str;

    /// Port the server-side tunnel listens on inside its pod
    fn port(&self) -> i32;

    /// Port reachable from outside the destination cluster
    fn exposed_port(&self) -> i32;

    /// Labels applied to generated objects and used to select server pods
    fn labels(&self) -> &BTreeMap<String, String>;
}

/// An endpoint whose address is already known
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Hostname clients connect to
    pub hostname: String,
    /// Port the server-side tunnel listens on
    pub port: i32,
    /// Port reachable from outside the cluster
    pub exposed_port: i32,
    /// Labels for generated objects
    pub labels: BTreeMap<String, String>,
}

impl ResolvedEndpoint {
    /// Create an endpoint with no labels
    pub fn new(hostname: impl Into<String>, port: i32, exposed_port: i32) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            exposed_port,
            labels: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl Endpoint for ResolvedEndpoint {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn port(&self) -> i32 {
        self.port
    }

    fn exposed_port(&self) -> i32 {
        self.exposed_port
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}
