//! A one-shot readiness gate for the ingress cache.
//!
//! [`channel`] returns a [`SyncTrigger`], owned by the reflector's watch task,
//! and a [`SyncBarrier`] that may be cloned and awaited by any number of
//! tasks. Firing consumes the trigger, so the gate can only ever be opened
//! once.

use std::future::Future;
use tokio::sync::watch;

/// Opens the paired [`SyncBarrier`].
#[derive(Debug)]
pub struct SyncTrigger(watch::Sender<bool>);

/// Waits for the initial ingress list to be applied to the cache.
#[derive(Clone, Debug)]
pub struct SyncBarrier(watch::Receiver<bool>);

pub fn channel() -> (SyncTrigger, SyncBarrier) {
    let (tx, rx) = watch::channel(false);
    (SyncTrigger(tx), SyncBarrier(rx))
}

// === impl SyncTrigger ===

impl SyncTrigger {
    pub fn fire(self) {
        let already = self.0.send_replace(true);
        debug_assert!(!already, "sync barrier must only be fired once");
    }
}

// === impl SyncBarrier ===

impl SyncBarrier {
    pub fn is_synced(&self) -> bool {
        *self.0.borrow()
    }

    /// Returns true once the barrier fires, or false if `timeout` completes
    /// first.
    pub async fn wait_for_sync<F>(&self, timeout: F) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            synced = self.synced() => synced,
            () = timeout => false,
        }
    }

    /// Resolves when the barrier fires. Resolves to false if the trigger is
    /// dropped without firing, since the barrier can then never open.
    pub(crate) async fn synced(&self) -> bool {
        let mut rx = self.0.clone();
        let res = rx.wait_for(|synced| *synced).await;
        res.is_ok()
    }
}
