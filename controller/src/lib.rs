#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod announce;
pub mod cache;
mod error;
pub mod ingress;
pub mod namespace;
pub mod reflector;
pub mod sync;

pub use self::{
    announce::{Announcement, AnnouncementKind},
    cache::Cache,
    error::{Error, Result},
    ingress::{ApiVersion, BackendMatch, IngressResource, MeshService},
    namespace::{MonitoredNamespaces, NamespaceFilter},
    reflector::Reflector,
    sync::SyncBarrier,
};
pub use k8s_openapi::api::networking::{v1, v1beta1};

use kube::runtime::watcher;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Mirrors the cluster's ingresses for exactly one `networking.k8s.io` API
/// version, chosen when the monitor is created.
pub enum Monitor {
    V1(Reflector<v1::Ingress>),
    V1beta1(Reflector<v1beta1::Ingress>),
}

// === impl Monitor ===

impl Monitor {
    pub fn new(
        version: ApiVersion,
        filter: Arc<dyn NamespaceFilter>,
        announcements: mpsc::Sender<Announcement>,
    ) -> Self {
        match version {
            ApiVersion::NetworkingV1 => Self::V1(Reflector::new(filter, announcements)),
            ApiVersion::NetworkingV1beta1 => Self::V1beta1(Reflector::new(filter, announcements)),
        }
    }

    pub fn watch(self, client: kube::Client, config: watcher::Config) -> Self {
        match self {
            Self::V1(r) => Self::V1(r.watch(client, config)),
            Self::V1beta1(r) => Self::V1beta1(r.watch(client, config)),
        }
    }

    pub fn with_resync(self, period: Duration) -> Self {
        match self {
            Self::V1(r) => Self::V1(r.with_resync(period)),
            Self::V1beta1(r) => Self::V1beta1(r.with_resync(period)),
        }
    }

    pub fn api_version(&self) -> ApiVersion {
        match self {
            Self::V1(_) => ApiVersion::NetworkingV1,
            Self::V1beta1(_) => ApiVersion::NetworkingV1beta1,
        }
    }

    /// Starts watching ingresses, returning once the cache has synced. See
    /// [`Reflector::start`].
    pub async fn start<F>(&mut self, stop: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            Self::V1(r) => r.start(stop).await,
            Self::V1beta1(r) => r.start(stop).await,
        }
    }

    pub fn sync_barrier(&self) -> SyncBarrier {
        match self {
            Self::V1(r) => r.sync_barrier(),
            Self::V1beta1(r) => r.sync_barrier(),
        }
    }

    pub async fn wait_for_sync<F>(&self, timeout: F) -> bool
    where
        F: Future<Output = ()>,
    {
        self.sync_barrier().wait_for_sync(timeout).await
    }

    /// Returns the `networking.k8s.io/v1` ingresses that route to `service`.
    pub fn ingresses_v1(&self, service: &MeshService) -> Result<Vec<Arc<v1::Ingress>>> {
        match self {
            Self::V1(r) => Ok(r.find_ingresses(service)),
            Self::V1beta1(_) => Err(Error::WrongSchemaVersion {
                expected: ApiVersion::NetworkingV1,
                actual: self.api_version(),
            }),
        }
    }

    /// Returns the `networking.k8s.io/v1beta1` ingresses that route to
    /// `service`.
    pub fn ingresses_v1beta1(
        &self,
        service: &MeshService,
    ) -> Result<Vec<Arc<v1beta1::Ingress>>> {
        match self {
            Self::V1beta1(r) => Ok(r.find_ingresses(service)),
            Self::V1(_) => Err(Error::WrongSchemaVersion {
                expected: ApiVersion::NetworkingV1beta1,
                actual: self.api_version(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::tests::{ingress_v1, ingress_v1beta1};
    use futures::future;
    use kube::ResourceExt;
    use std::io;
    use tokio_stream::wrappers::ReceiverStream;

    fn names<K: IngressResource>(ings: Vec<Arc<K>>) -> Vec<String> {
        ings.iter().map(|i| i.name_any()).collect()
    }

    #[tokio::test]
    async fn rejects_queries_for_the_other_version() {
        let (tx, _rx) = mpsc::channel(1);
        let filter = Arc::new(MonitoredNamespaces::all());
        let svc = MeshService::new("ns1", "web");

        let v1 = Monitor::new(ApiVersion::NetworkingV1, filter.clone(), tx.clone());
        assert_eq!(v1.api_version(), ApiVersion::NetworkingV1);
        assert!(v1.ingresses_v1(&svc).unwrap().is_empty());
        assert!(matches!(
            v1.ingresses_v1beta1(&svc),
            Err(Error::WrongSchemaVersion {
                expected: ApiVersion::NetworkingV1beta1,
                actual: ApiVersion::NetworkingV1,
            })
        ));

        let v1beta1 = Monitor::new(ApiVersion::NetworkingV1beta1, filter, tx);
        assert_eq!(v1beta1.api_version(), ApiVersion::NetworkingV1beta1);
        assert!(v1beta1.ingresses_v1beta1(&svc).unwrap().is_empty());
        assert!(matches!(
            v1beta1.ingresses_v1(&svc),
            Err(Error::WrongSchemaVersion {
                expected: ApiVersion::NetworkingV1,
                actual: ApiVersion::NetworkingV1beta1,
            })
        ));
    }

    #[tokio::test]
    async fn queries_before_sync_are_empty() {
        let (tx, _rx) = mpsc::channel(1);
        let monitor = Monitor::new(
            ApiVersion::NetworkingV1,
            Arc::new(MonitoredNamespaces::all()),
            tx,
        );
        assert!(!monitor.wait_for_sync(future::ready(())).await);
        let found = monitor.ingresses_v1(&MeshService::new("ns1", "web")).unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn default_backend_updates_are_observed() {
        let (tx, mut announcements) = mpsc::channel(10);
        let (events, events_rx) =
            mpsc::channel::<Result<watcher::Event<v1::Ingress>, io::Error>>(10);
        let mut monitor = match Monitor::new(
            ApiVersion::NetworkingV1,
            Arc::new(MonitoredNamespaces::all()),
            tx,
        ) {
            Monitor::V1(r) => Monitor::V1(r.with_events(ReceiverStream::new(events_rx))),
            Monitor::V1beta1(_) => unreachable!(),
        };

        let ing = ingress_v1("ns1", "ing1", Some("svcA"), &[]);
        events
            .send(Ok(watcher::Event::Restarted(vec![ing])))
            .await
            .unwrap();
        monitor.start(future::pending()).await.expect("must sync");
        assert!(monitor.wait_for_sync(future::pending()).await);

        let svc_a = MeshService::new("ns1", "svcA");
        let svc_b = MeshService::new("ns1", "svcB");
        assert_eq!(names(monitor.ingresses_v1(&svc_a).unwrap()), ["ing1"]);
        assert!(monitor.ingresses_v1(&svc_b).unwrap().is_empty());

        let ing = ingress_v1("ns1", "ing1", Some("svcB"), &[]);
        events
            .send(Ok(watcher::Event::Applied(ing)))
            .await
            .unwrap();
        assert_eq!(
            announcements.recv().await,
            Some(Announcement::ingress(AnnouncementKind::Updated, "ns1", "ing1"))
        );
        assert!(monitor.ingresses_v1(&svc_a).unwrap().is_empty());
        assert_eq!(names(monitor.ingresses_v1(&svc_b).unwrap()), ["ing1"]);
    }

    #[tokio::test]
    async fn v1beta1_rule_paths_match_once() {
        let (tx, _announcements) = mpsc::channel(10);
        let (events, events_rx) =
            mpsc::channel::<Result<watcher::Event<v1beta1::Ingress>, io::Error>>(10);
        let mut monitor = match Monitor::new(
            ApiVersion::NetworkingV1beta1,
            Arc::new(["ns1"].into_iter().collect::<MonitoredNamespaces>()),
            tx,
        ) {
            Monitor::V1beta1(r) => {
                Monitor::V1beta1(r.with_events(ReceiverStream::new(events_rx)))
            }
            Monitor::V1(_) => unreachable!(),
        };

        events
            .send(Ok(watcher::Event::Restarted(vec![
                ingress_v1beta1("ns1", "ing1", None, &[&["svcX", "svcY"], &["svcX"]]),
                ingress_v1beta1("ns2", "ing2", None, &[&["svcX"]]),
            ])))
            .await
            .unwrap();
        monitor.start(future::pending()).await.expect("must sync");

        let found = monitor
            .ingresses_v1beta1(&MeshService::new("ns1", "svcX"))
            .unwrap();
        assert_eq!(names(found), ["ing1"]);
        let found = monitor
            .ingresses_v1beta1(&MeshService::new("ns2", "svcX"))
            .unwrap();
        assert!(found.is_empty());
    }
}
