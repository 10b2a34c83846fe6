//! Ingress API versions and the backend lookups over cached ingresses.

use crate::{Cache, Error, NamespaceFilter};
use k8s_openapi::api::networking::{v1, v1beta1};
use serde::de::DeserializeOwned;
use std::{fmt, str::FromStr, sync::Arc};

/// The `networking.k8s.io` API version watched by a monitor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ApiVersion {
    #[serde(rename = "networking.k8s.io/v1")]
    NetworkingV1,
    #[serde(rename = "networking.k8s.io/v1beta1")]
    NetworkingV1beta1,
}

/// A service for which ingresses are looked up.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MeshService {
    pub namespace: String,
    pub name: String,
}

/// How an ingress routes to a service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMatch {
    DefaultBackend,
    Rule,
}

/// Typed access to the parts of an ingress that backend lookups need, one
/// implementation per API version.
pub trait IngressResource:
    kube::Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const API_VERSION: ApiVersion;

    /// The name of the default backend's service, if there is one.
    fn default_backend_service(&self) -> Option<&str>;

    /// Returns true if any rule path routes to `service`. Stops at the first
    /// matching path across all rules.
    fn has_rule_backend(&self, service: &str) -> bool;

    fn namespace_str(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    /// The default backend takes precedence; rules are only consulted when it
    /// does not match.
    fn routes_to(&self, service: &str) -> Option<BackendMatch> {
        if self.default_backend_service() == Some(service) {
            return Some(BackendMatch::DefaultBackend);
        }
        if self.has_rule_backend(service) {
            return Some(BackendMatch::Rule);
        }
        None
    }
}

/// Returns the cached ingresses in the service's namespace that route to it,
/// in cache order. Each ingress appears at most once.
pub fn find_ingresses<K: IngressResource>(
    cache: &Cache<K>,
    filter: &dyn NamespaceFilter,
    service: &MeshService,
) -> Vec<Arc<K>> {
    cache
        .list()
        .into_iter()
        .filter(|ing| {
            let namespace = match ing.namespace_str() {
                Some(ns) => ns,
                None => {
                    tracing::warn!(
                        ingress = ?ing.meta().name,
                        "cached ingress has no namespace"
                    );
                    return false;
                }
            };
            // Ingresses are cached regardless of namespace, so recheck here.
            if !filter.is_monitored(namespace) || namespace != service.namespace {
                return false;
            }
            ing.routes_to(&service.name).is_some()
        })
        .collect()
}

// === impl ApiVersion ===

impl ApiVersion {
    pub const ALL: [ApiVersion; 2] = [Self::NetworkingV1, Self::NetworkingV1beta1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkingV1 => "networking.k8s.io/v1",
            Self::NetworkingV1beta1 => "networking.k8s.io/v1beta1",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| Error::UnsupportedApiVersion(s.to_string()))
    }
}

// === impl MeshService ===

impl MeshService {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MeshService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl BackendMatch ===

impl fmt::Display for BackendMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefaultBackend => f.write_str("default-backend"),
            Self::Rule => f.write_str("rule"),
        }
    }
}

// === impl IngressResource ===

impl IngressResource for v1::Ingress {
    const API_VERSION: ApiVersion = ApiVersion::NetworkingV1;

    fn default_backend_service(&self) -> Option<&str> {
        let backend = self.spec.as_ref()?.default_backend.as_ref()?;
        backend.service.as_ref().map(|svc| svc.name.as_str())
    }

    fn has_rule_backend(&self, service: &str) -> bool {
        self.spec
            .iter()
            .flat_map(|spec| spec.rules.iter().flatten())
            .filter_map(|rule| rule.http.as_ref())
            .flat_map(|http| &http.paths)
            .filter_map(|path| path.backend.service.as_ref())
            .any(|svc| svc.name == service)
    }
}

impl IngressResource for v1beta1::Ingress {
    const API_VERSION: ApiVersion = ApiVersion::NetworkingV1beta1;

    fn default_backend_service(&self) -> Option<&str> {
        let backend = self.spec.as_ref()?.backend.as_ref()?;
        backend.service_name.as_deref()
    }

    fn has_rule_backend(&self, service: &str) -> bool {
        self.spec
            .iter()
            .flat_map(|spec| spec.rules.iter().flatten())
            .filter_map(|rule| rule.http.as_ref())
            .flat_map(|http| &http.paths)
            .any(|path| path.backend.service_name.as_deref() == Some(service))
    }
}
