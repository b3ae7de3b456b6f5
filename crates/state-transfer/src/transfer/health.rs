//! Readiness checks for transfer pods
//!
//! A transfer pod runs exactly two containers: the tunnel and the sync tool.
//! Any other count means the pod was assembled wrong, which is reported as an
//! error rather than "not ready yet".

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, trace};

use crate::client::{ClusterClient, ObjectKey};
use crate::Error;

/// Containers every transfer pod runs
pub const EXPECTED_CONTAINER_COUNT: usize = 2;

/// Check a single pod
///
/// Errors from fetching the pod (including not found) are returned unchanged.
pub async fn is_pod_healthy(client: &dyn ClusterClient, key: &ObjectKey) -> Result<bool, Error> {
    let pod = client.get_pod(key).await?;
    are_containers_ready(&pod)
}

/// Whether every container of a fully assembled transfer pod is ready
///
/// Returns `Err(Error::Health { .. })` for a pod with the wrong number of
/// container statuses or with a container that isn't ready.
pub fn are_containers_ready(pod: &Pod) -> Result<bool, Error> {
    let key = ObjectKey::of(pod);
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    if statuses.len() != EXPECTED_CONTAINER_COUNT {
        return Err(Error::health(
            key.to_string(),
            format!(
                "expected {} container statuses found {}, for pod {}",
                EXPECTED_CONTAINER_COUNT,
                statuses.len(),
                key
            ),
        ));
    }

    if let Some(status) = statuses.iter().find(|s| !s.ready) {
        return Err(Error::health(
            key.to_string(),
            format!("container {} in pod {} is not ready", status.name, key),
        ));
    }

    trace!(pod = %key, "all containers ready");
    Ok(true)
}

/// Check whether at least one replica among the selected pods is healthy
///
/// Returns `Ok(true)` at the first healthy pod. If none is healthy every
/// per-pod error is returned together; an empty selection is `Ok(false)`.
pub async fn are_filtered_pods_healthy(
    client: &dyn ClusterClient,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<bool, Error> {
    let pods = client.list_pods(namespace, labels).await?;

    let mut errors = Vec::new();
    for pod in &pods {
        match are_containers_ready(pod) {
            Ok(true) => {
                debug!(pod = %ObjectKey::of(pod), "found healthy replica");
                return Ok(true);
            }
            Ok(false) => {}
            Err(e) => errors.push(e),
        }
    }

    debug!(
        namespace = %namespace,
        pods = pods.len(),
        failures = errors.len(),
        "no healthy replica"
    );
    Error::aggregate(errors).map(|()| false)
}
