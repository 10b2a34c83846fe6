use crate::table::Table;
use anyhow::{Context, Result};
use kube::{runtime::watcher, Client, ResourceExt};
use mesh_ingress_controller::{
    Announcement, ApiVersion, BackendMatch, IngressResource, MeshService, Monitor,
    MonitoredNamespaces,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressMatch {
    namespace: String,
    name: String,
    api_version: ApiVersion,
    matched_by: BackendMatch,
}

/// Syncs the ingresses in the service's namespace and returns those that
/// route to the service.
pub async fn lookup(
    client: Client,
    version: ApiVersion,
    service: &MeshService,
    timeout: time::Duration,
) -> Result<Vec<IngressMatch>> {
    let filter = Arc::new(MonitoredNamespaces::from_iter([service.namespace.as_str()]));
    let config =
        watcher::Config::default().fields(&format!("metadata.namespace={}", service.namespace));
    let (announcements, announcements_rx) = mpsc::channel(1);
    let monitor = Monitor::new(version, filter, announcements).watch(client, config);
    query(monitor, announcements_rx, service, timeout).await
}

/// Starts `monitor` and queries it once it has synced. The watch is stopped
/// when the query returns.
///
/// Announcements are not consumed by a one-off lookup, but the receiver is
/// held until the watch has been told to stop.
async fn query(
    mut monitor: Monitor,
    _announcements: mpsc::Receiver<Announcement>,
    service: &MeshService,
    timeout: time::Duration,
) -> Result<Vec<IngressMatch>> {
    let version = monitor.api_version();
    let (_stop, stopped) = oneshot::channel::<()>();
    monitor
        .start(async move {
            tokio::select! {
                _ = stopped => {}
                () = time::sleep(timeout) => {}
            }
        })
        .await
        .with_context(|| format!("failed to sync {} ingresses", version))?;

    let mut matches = match version {
        ApiVersion::NetworkingV1 => monitor
            .ingresses_v1(service)?
            .iter()
            .map(|ing| IngressMatch::new(&**ing, service))
            .collect::<Vec<_>>(),
        ApiVersion::NetworkingV1beta1 => monitor
            .ingresses_v1beta1(service)?
            .iter()
            .map(|ing| IngressMatch::new(&**ing, service))
            .collect(),
    };
    matches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(matches)
}

pub fn print_lookup(matches: &[IngressMatch]) {
    let table = Table::new(matches)
        .column("NAMESPACE", |m| m.namespace.clone())
        .column("INGRESS", |m| m.name.clone())
        .column("API VERSION", |m| m.api_version.to_string())
        .column("MATCHED BY", |m| m.matched_by.to_string());
    print!("{}", table);
}

pub fn json_print_lookup(matches: &[IngressMatch]) {
    serde_json::to_writer_pretty(std::io::stdout(), matches).expect("serialization failed");
    println!();
}

// === impl IngressMatch ===

impl IngressMatch {
    fn new<K: IngressResource>(ingress: &K, service: &MeshService) -> Self {
        Self {
            namespace: ingress.namespace().unwrap_or_default(),
            name: ingress.name_any(),
            api_version: K::API_VERSION,
            // Lookups only return ingresses that route to the service.
            matched_by: ingress
                .routes_to(&service.name)
                .unwrap_or(BackendMatch::Rule),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_ingress_controller::{v1, v1beta1, Reflector};
    use std::io;
    use tokio_stream::wrappers::ReceiverStream;

    fn default_backend_ingress(ns: &str, name: &str, svc: &str) -> v1::Ingress {
        let mut ing = v1::Ingress::default();
        ing.metadata.namespace = Some(ns.to_string());
        ing.metadata.name = Some(name.to_string());
        ing.spec = Some(v1::IngressSpec {
            default_backend: Some(v1::IngressBackend {
                service: Some(v1::IngressServiceBackend {
                    name: svc.to_string(),
                    port: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        ing
    }

    #[tokio::test]
    async fn query_stops_the_watch_on_return() {
        let (announcements, announcements_rx) = mpsc::channel(1);
        let (events, events_rx) =
            mpsc::channel::<Result<watcher::Event<v1::Ingress>, io::Error>>(10);
        let monitor = Monitor::V1(
            Reflector::new(Arc::new(MonitoredNamespaces::all()), announcements)
                .with_events(ReceiverStream::new(events_rx)),
        );
        events
            .send(Ok(watcher::Event::Restarted(vec![
                default_backend_ingress("ns1", "ing2", "web"),
                default_backend_ingress("ns1", "ing1", "web"),
                default_backend_ingress("ns1", "ing3", "api"),
            ])))
            .await
            .unwrap();

        let matches = query(
            monitor,
            announcements_rx,
            &MeshService::new("ns1", "web"),
            time::Duration::from_secs(60),
        )
        .await
        .expect("lookup must succeed");
        let names = matches.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["ing1", "ing2"]);

        time::timeout(time::Duration::from_secs(5), events.closed())
            .await
            .expect("watch must stop once the lookup returns");
    }

    #[test]
    fn match_reports_how_the_service_is_routed() {
        let ing = default_backend_ingress("ns1", "ing1", "web");

        let m = IngressMatch::new(&ing, &MeshService::new("ns1", "web"));
        assert_eq!(m.namespace, "ns1");
        assert_eq!(m.name, "ing1");
        assert_eq!(m.api_version, ApiVersion::NetworkingV1);
        assert_eq!(m.matched_by, BackendMatch::DefaultBackend);
    }

    #[test]
    fn json_output() {
        let mut ing = v1beta1::Ingress::default();
        ing.metadata.namespace = Some("ns1".to_string());
        ing.metadata.name = Some("ing1".to_string());
        ing.spec = Some(v1beta1::IngressSpec {
            rules: Some(vec![v1beta1::IngressRule {
                host: None,
                http: Some(v1beta1::HTTPIngressRuleValue {
                    paths: vec![v1beta1::HTTPIngressPath {
                        backend: v1beta1::IngressBackend {
                            service_name: Some("web".to_string()),
                            ..Default::default()
                        },
                        path: None,
                        path_type: None,
                    }],
                }),
            }]),
            ..Default::default()
        });

        let m = IngressMatch::new(&ing, &MeshService::new("ns1", "web"));
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            serde_json::json!({
                "namespace": "ns1",
                "name": "ing1",
                "apiVersion": "networking.k8s.io/v1beta1",
                "matchedBy": "rule",
            })
        );
    }
}
