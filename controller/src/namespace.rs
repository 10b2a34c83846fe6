use std::collections::BTreeSet;

/// Decides whether ingresses in a namespace belong to the mesh.
pub trait NamespaceFilter: Send + Sync {
    fn is_monitored(&self, namespace: &str) -> bool;
}

impl<F> NamespaceFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_monitored(&self, namespace: &str) -> bool {
        (self)(namespace)
    }
}

/// A fixed set of monitored namespaces. An empty set monitors every namespace.
#[derive(Clone, Debug, Default)]
pub struct MonitoredNamespaces(BTreeSet<String>);

// === impl MonitoredNamespaces ===

impl MonitoredNamespaces {
    pub fn all() -> Self {
        Self::default()
    }
}

impl NamespaceFilter for MonitoredNamespaces {
    fn is_monitored(&self, namespace: &str) -> bool {
        self.0.is_empty() || self.0.contains(namespace)
    }
}

impl<S: Into<String>> FromIterator<S> for MonitoredNamespaces {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_monitors_everything() {
        let all = MonitoredNamespaces::all();
        assert!(all.is_monitored("default"));
        assert!(all.is_monitored("kube-system"));
    }

    #[test]
    fn explicit_set() {
        let nss = ["emojivoto", "booksapp"].into_iter().collect::<MonitoredNamespaces>();
        assert!(nss.is_monitored("emojivoto"));
        assert!(nss.is_monitored("booksapp"));
        assert!(!nss.is_monitored("default"));
    }

    #[test]
    fn closures_are_filters() {
        let filter = |ns: &str| ns.starts_with("mesh-");
        assert!(filter.is_monitored("mesh-a"));
        assert!(!NamespaceFilter::is_monitored(&filter, "other"));
    }
}
