//! Registry of the resource kinds a transfer side works with
//!
//! Typed k8s-openapi resources carry their group/version/kind at compile time;
//! kinds without a Rust type (OpenShift Routes) are registered from their
//! apiVersion string. Building the registry validates every entry, so a bad
//! registration fails before any cluster call is made.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use kube::api::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Resource;

use crate::Error;

/// apiVersion of OpenShift Routes
pub const ROUTE_API_VERSION: &str = "route.openshift.io/v1";

/// Kind of OpenShift Routes
pub const ROUTE_KIND: &str = "Route";

/// Known resource kinds, keyed by `apiVersion/kind`
#[derive(Clone, Debug, Default)]
pub struct Scheme {
    kinds: BTreeMap<String, ApiResource>,
}

impl Scheme {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed resource
    pub fn register<K>(&mut self) -> &mut Self
    where
        K: Resource<DynamicType = ()>,
    {
        let ar = ApiResource::erase::<K>(&());
        self.kinds.insert(gvk_key(&ar.api_version, &ar.kind), ar);
        self
    }

    /// Register a kind by apiVersion string (`group/version` or `version`)
    pub fn register_dynamic(&mut self, api_version: &str, kind: &str) -> Result<&mut Self, Error> {
        let (group, version) = parse_api_version(api_version)?;
        if kind.is_empty() || !kind.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err(Error::validation_for_field(
                "kind",
                format!("invalid kind {:?} for {}", kind, api_version),
            ));
        }
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let ar = ApiResource::from_gvk_with_plural(&gvk, &pluralize_kind(kind));
        self.kinds.insert(gvk_key(api_version, kind), ar);
        Ok(self)
    }

    /// Look up a registered kind
    pub fn get(&self, api_version: &str, kind: &str) -> Option<&ApiResource> {
        self.kinds.get(&gvk_key(api_version, kind))
    }

    /// Whether a kind is registered
    pub fn recognizes(&self, api_version: &str, kind: &str) -> bool {
        self.get(api_version, kind).is_some()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Kinds used to run the server side: Routes, Deployments and core objects
pub fn server_scheme() -> Result<Scheme, Error> {
    let mut scheme = Scheme::new();
    scheme.register_dynamic(ROUTE_API_VERSION, ROUTE_KIND)?;
    scheme
        .register::<Deployment>()
        .register::<Pod>()
        .register::<Service>()
        .register::<ConfigMap>()
        .register::<Secret>()
        .register::<PersistentVolumeClaim>();
    Ok(scheme)
}

fn gvk_key(api_version: &str, kind: &str) -> String {
    format!("{}/{}", api_version, kind)
}

fn parse_api_version(api_version: &str) -> Result<(&str, &str), Error> {
    let parsed = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    if parsed.1.is_empty() || parsed.1.contains('/') || api_version.starts_with('/') {
        return Err(Error::validation_for_field(
            "apiVersion",
            format!("invalid apiVersion {:?}", api_version),
        ));
    }
    Ok(parsed)
}

fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if lower.ends_with('s') {
        format!("{}es", lower)
    } else if let Some(stem) = lower.strip_suffix('y') {
        format!("{}ies", stem)
    } else {
        format!("{}s", lower)
    }
}
