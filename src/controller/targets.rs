//! # Target Namespace Resolver
//!
//! Computes the namespaces that should hold a replica of a source.
//!
//! With a `desired-namespaces` annotation each listed name is looked up and
//! kept only if it exists; otherwise every namespace is a candidate. Both
//! branches then drop the source's own namespace, the disallowed namespaces
//! and namespaces that are already terminating.

use crate::constants::{DESIRED_NAMESPACES_ANNOTATION, NAMESPACE_PHASE_TERMINATING};
use crate::controller::client::NamespaceClient;
use crate::controller::reconciler::types::ReconcilerError;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

/// Parse a comma-separated namespace list
///
/// Whitespace is trimmed, empty entries are ignored and duplicates keep their
/// first position.
#[must_use]
pub fn parse_namespace_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Namespaces explicitly requested by the source, if it names any
#[must_use]
pub fn desired_namespaces(meta: &ObjectMeta) -> Option<Vec<String>> {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(DESIRED_NAMESPACES_ANNOTATION))
        .map(|raw| parse_namespace_list(raw))
}

#[must_use]
pub fn is_terminating(namespace: &Namespace) -> bool {
    namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(NAMESPACE_PHASE_TERMINATING)
}

/// Resolve the target namespace set of a source
///
/// Lookup failures abort resolution. A desired namespace that does not exist
/// is not an error and is silently dropped.
pub async fn resolve_targets(
    source: &ObjectMeta,
    namespaces: &dyn NamespaceClient,
    disallowed: &[String],
) -> Result<Vec<String>, ReconcilerError> {
    let candidates = match desired_namespaces(source) {
        Some(desired) => {
            let mut existing = Vec::with_capacity(desired.len());
            for name in desired {
                match namespaces.get(&name).await? {
                    Some(namespace) if !is_terminating(&namespace) => existing.push(name),
                    Some(_) => debug!(namespace = %name, "Desired namespace is terminating, skipping"),
                    None => debug!(namespace = %name, "Desired namespace does not exist, skipping"),
                }
            }
            existing
        }
        None => namespaces
            .list()
            .await?
            .into_iter()
            .filter(|namespace| !is_terminating(namespace))
            .filter_map(|namespace| namespace.metadata.name)
            .collect(),
    };

    let own_namespace = source.namespace.as_deref().unwrap_or_default();
    let mut targets: Vec<String> = Vec::with_capacity(candidates.len());
    for name in candidates {
        if name == own_namespace
            || disallowed.iter().any(|d| *d == name)
            || targets.contains(&name)
        {
            continue;
        }
        targets.push(name);
    }
    Ok(targets)
}
