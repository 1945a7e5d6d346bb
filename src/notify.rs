//! In-process notification bus.
//!
//! Each registration declares its delivery: synchronous handlers run inline
//! on the publisher's thread, deferred handlers run in publish order on a
//! dedicated dispatcher thread.

use crate::audit::BatchReport;
use crate::staging::StagingPhase;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    GeneratorSucceeded {
        batch_id: String,
        generator_name: String,
        product_count: usize,
    },
    GeneratorFailed {
        batch_id: String,
        generator_name: String,
        error: String,
    },
    BatchCompleted {
        report: BatchReport,
    },
    StagingRequired {
        batch_id: String,
        phase: StagingPhase,
    },
    SiteChanged {
        site_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    GeneratorSucceeded,
    GeneratorFailed,
    BatchCompleted,
    StagingRequired,
    SiteChanged,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::GeneratorSucceeded { .. } => NotificationKind::GeneratorSucceeded,
            Notification::GeneratorFailed { .. } => NotificationKind::GeneratorFailed,
            Notification::BatchCompleted { .. } => NotificationKind::BatchCompleted,
            Notification::StagingRequired { .. } => NotificationKind::StagingRequired,
            Notification::SiteChanged { .. } => NotificationKind::SiteChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Synchronous,
    Deferred,
}

pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kinds: Vec<NotificationKind>,
    delivery: Delivery,
    handler: Handler,
}

type DeferredJob = Box<dyn FnOnce() + Send + 'static>;

pub struct NotificationBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    deferred: Mutex<Option<Sender<DeferredJob>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (sender, receiver) = channel::<DeferredJob>();
        let spawned = std::thread::Builder::new()
            .name("hazprod-notify".to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            });
        let deferred = match spawned {
            Ok(_) => Some(sender),
            Err(err) => {
                warn!(error = %err, "Deferred notification thread unavailable; delivering inline");
                None
            }
        };
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            deferred: Mutex::new(deferred),
        }
    }

    pub fn subscribe<F>(&self, kinds: &[NotificationKind], delivery: Delivery, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            kinds: kinds.to_vec(),
            delivery,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn publish(&self, notification: Notification) {
        let kind = notification.kind();
        let targets: Vec<(Delivery, Handler)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| (s.delivery, Arc::clone(&s.handler)))
            .collect();

        for (delivery, handler) in targets {
            match delivery {
                Delivery::Synchronous => handler(&notification),
                Delivery::Deferred => {
                    let notification = notification.clone();
                    self.defer(Box::new(move || handler(&notification)));
                }
            }
        }
    }

    /// Block until every deferred delivery queued so far has run.
    pub fn flush(&self) {
        let (tx, rx) = channel();
        self.defer(Box::new(move || {
            let _ = tx.send(());
        }));
        let _ = rx.recv();
    }

    fn defer(&self, job: DeferredJob) {
        let guard = self.deferred.lock();
        let job = match guard.as_ref() {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(returned) => returned.0,
            },
            None => job,
        };
        drop(guard);
        job();
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
