//! Mirrors the cluster's ingresses into a local [`Cache`].
//!
//! A [`Reflector`] consumes a `kube` watch stream on a background task. The
//! first `Restarted` event is the initial list: it populates the cache without
//! publishing announcements and then opens the [`SyncBarrier`]. Afterwards,
//! every applied or deleted ingress updates the cache and, if its namespace is
//! monitored, publishes an [`Announcement`].

use crate::{
    announce::{Announcement, AnnouncementKind},
    ingress::{self, IngressResource, MeshService},
    sync::{self, SyncBarrier, SyncTrigger},
    Cache, Error, NamespaceFilter, Result,
};
use futures::{
    future::{self, BoxFuture, Shared},
    prelude::*,
    stream::BoxStream,
};
use kube::{
    runtime::{reflector::ObjectRef, watcher, WatchStreamExt},
    Api,
};
use std::sync::Arc;
use tokio::{sync::mpsc, time};
use tracing::Instrument;

type WatchStream<K> = BoxStream<'static, Result<watcher::Event<K>, anyhow::Error>>;

type Stop = Shared<BoxFuture<'static, ()>>;

pub struct Reflector<K: IngressResource> {
    cache: Cache<K>,
    synced: SyncBarrier,
    trigger: Option<SyncTrigger>,
    events: Option<WatchStream<K>>,
    filter: Arc<dyn NamespaceFilter>,
    announcements: mpsc::Sender<Announcement>,
    resync: Option<time::Duration>,
}

/// State owned by the background watch task. It is the only writer to the
/// cache.
struct Watch<K: IngressResource> {
    cache: Cache<K>,
    trigger: Option<SyncTrigger>,
    filter: Arc<dyn NamespaceFilter>,
    announcements: mpsc::Sender<Announcement>,
    stop: Stop,
}

// === impl Reflector ===

impl<K: IngressResource> Reflector<K> {
    /// Creates a reflector without a watch source. One must be configured
    /// with [`Reflector::watch`] or [`Reflector::with_events`] before it is
    /// started.
    pub fn new(
        filter: Arc<dyn NamespaceFilter>,
        announcements: mpsc::Sender<Announcement>,
    ) -> Self {
        let (trigger, synced) = sync::channel();
        Self {
            cache: Cache::new(),
            synced,
            trigger: Some(trigger),
            events: None,
            filter,
            announcements,
            resync: None,
        }
    }

    /// Watches all ingresses of this API version through the Kubernetes API.
    pub fn watch(self, client: kube::Client, config: watcher::Config) -> Self {
        let api = Api::<K>::all(client);
        self.with_events(watcher(api, config).default_backoff())
    }

    /// Uses `events` as the watch source.
    pub fn with_events<S, E>(mut self, events: S) -> Self
    where
        S: Stream<Item = Result<watcher::Event<K>, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        self.events = Some(events.err_into().boxed());
        self
    }

    /// Re-announces every monitored ingress as updated each `period`. A zero
    /// period disables resyncs.
    pub fn with_resync(mut self, period: time::Duration) -> Self {
        self.resync = if period.is_zero() { None } else { Some(period) };
        self
    }

    pub fn cache(&self) -> &Cache<K> {
        &self.cache
    }

    pub fn sync_barrier(&self) -> SyncBarrier {
        self.synced.clone()
    }

    /// Spawns the watch task and waits for the initial list to populate the
    /// cache.
    ///
    /// The watch task runs until `stop` completes. If `stop` completes before
    /// the cache is synced, [`Error::SyncTimeout`] is returned.
    pub async fn start<F>(&mut self, stop: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let events = self.events.take().ok_or(Error::NotInitialized)?;
        let trigger = self.trigger.take().ok_or(Error::NotInitialized)?;
        let stop = stop.boxed().shared();

        let watch = Watch {
            cache: self.cache.clone(),
            trigger: Some(trigger),
            filter: self.filter.clone(),
            announcements: self.announcements.clone(),
            stop: stop.clone(),
        };
        tokio::spawn(
            watch
                .run(events, self.resync)
                .instrument(tracing::info_span!("ingress", version = %K::API_VERSION)),
        );

        tracing::info!(version = %K::API_VERSION, "waiting for ingress cache sync");
        tokio::select! {
            biased;
            synced = self.synced.synced() => {
                if !synced {
                    // The watch task also exits when `stop` completes, which
                    // may be observed here before `stop` itself.
                    if stop.peek().is_some() {
                        return Err(Error::SyncTimeout);
                    }
                    return Err(Error::WatchClosed);
                }
            }
            () = stop.clone() => return Err(Error::SyncTimeout),
        }

        tracing::info!(ingresses = self.cache.len(), "ingress cache synced");
        Ok(())
    }

    /// Returns the cached ingresses that route to `service`.
    pub fn find_ingresses(&self, service: &MeshService) -> Vec<Arc<K>> {
        ingress::find_ingresses(&self.cache, &*self.filter, service)
    }
}

// === impl Watch ===

impl<K: IngressResource> Watch<K> {
    async fn run(mut self, mut events: WatchStream<K>, resync: Option<time::Duration>) {
        let mut stop = self.stop.clone();
        let mut resync = resync.map(|period| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;

                () = &mut stop => {
                    tracing::debug!("ingress watch stopped");
                    return;
                }

                ev = events.next() => match ev {
                    Some(Ok(ev)) => self.handle(ev).await,
                    Some(Err(error)) => {
                        // The watcher re-lists after an error, so the cache is
                        // reconciled by the following `Restarted` event.
                        tracing::warn!(%error, "ingress watch failed");
                    }
                    None => {
                        tracing::debug!("ingress watch stream ended");
                        return;
                    }
                },

                () = tick(&mut resync), if self.trigger.is_none() => self.resync().await,
            }
        }
    }

    async fn handle(&mut self, ev: watcher::Event<K>) {
        match ev {
            watcher::Event::Restarted(ings) => self.reset(ings).await,
            watcher::Event::Applied(ing) => self.apply(ing).await,
            watcher::Event::Deleted(ing) => self.delete(ing).await,
        }
    }

    async fn apply(&mut self, ing: K) {
        let key = match object_ref(&ing) {
            Some(key) => key,
            None => return,
        };
        let kind = if self.cache.put(key.clone(), ing) {
            AnnouncementKind::Updated
        } else {
            AnnouncementKind::Added
        };

        // Nothing is announced until the initial list has been applied.
        if self.trigger.is_none() {
            self.announce(kind, &key).await;
        }
    }

    async fn delete(&mut self, ing: K) {
        let key = match object_ref(&ing) {
            Some(key) => key,
            None => return,
        };
        if self.cache.delete(&key).is_none() {
            tracing::debug!(
                namespace = ?key.namespace,
                name = %key.name,
                "deleted ingress was not cached"
            );
        }

        if self.trigger.is_none() {
            self.announce(AnnouncementKind::Deleted, &key).await;
        }
    }

    async fn reset(&mut self, ings: Vec<K>) {
        let ings = ings
            .into_iter()
            .filter_map(|ing| object_ref(&ing).map(|key| (key, ing)))
            .collect::<Vec<_>>();
        let keys = ings.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>();
        let mut prior = self.cache.reset(ings);

        if let Some(trigger) = self.trigger.take() {
            tracing::debug!(ingresses = keys.len(), "initial ingress list applied");
            trigger.fire();
            return;
        }

        tracing::debug!(
            ingresses = keys.len(),
            prior = prior.len(),
            "ingress watch restarted"
        );
        for key in keys {
            let kind = if prior.remove(&key) {
                AnnouncementKind::Updated
            } else {
                AnnouncementKind::Added
            };
            self.announce(kind, &key).await;
        }
        for key in prior {
            self.announce(AnnouncementKind::Deleted, &key).await;
        }
    }

    async fn resync(&mut self) {
        let keys = self.cache.keys();
        tracing::debug!(ingresses = keys.len(), "resyncing ingresses");
        for key in keys {
            self.announce(AnnouncementKind::Updated, &key).await;
        }
    }

    async fn announce(&self, kind: AnnouncementKind, key: &ObjectRef<K>) {
        let namespace = key.namespace.as_deref().unwrap_or_default();
        if !self.filter.is_monitored(namespace) {
            tracing::trace!(
                %namespace,
                name = %key.name,
                %kind,
                "ignoring ingress in unmonitored namespace"
            );
            return;
        }

        tracing::debug!(%namespace, name = %key.name, %kind, "announcing ingress");
        let announcement = Announcement::ingress(kind, namespace, &key.name);
        // A full channel must not keep the watch from stopping.
        tokio::select! {
            biased;
            () = self.stop.clone() => {
                tracing::debug!("dropping announcement because the watch is stopping");
            }
            res = self.announcements.send(announcement) => {
                if res.is_err() {
                    tracing::error!("dropping announcement because the channel is closed");
                }
            }
        }
    }
}

/// Identifies an ingress by namespace and name, skipping objects that lack
/// either.
fn object_ref<K: IngressResource>(ing: &K) -> Option<ObjectRef<K>> {
    let meta = ing.meta();
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(namespace), Some(name)) => Some(ObjectRef::new(name).within(namespace)),
        _ => {
            tracing::warn!(
                namespace = ?meta.namespace,
                name = ?meta.name,
                "skipping malformed ingress"
            );
            None
        }
    }
}

/// Waits for the next resync tick, or forever when resyncs are disabled.
async fn tick(interval: &mut Option<time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
