use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::error;

use crate::{utils::wrapping_inplace_add, value::PvValue};

/// Something that happened to a PV, as seen by its listeners
#[derive(Debug, Clone, PartialEq)]
pub enum PvEvent {
    /// A new merged value
    Value(PvValue),
    /// The channel lost its connection
    Disconnected,
    /// Write permission changed; always read-only while disconnected
    Permissions { read_only: bool },
}

/// Handle to remove a listener added with [`Pv::add_listener`](super::Pv::add_listener)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&PvEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(ListenerId, Callback)>,
}

/// Fan-out of PV events to callbacks, broadcast subscribers and the latest-value watch
pub(crate) struct Listeners {
    registry: Mutex<Registry>,
    events: broadcast::Sender<PvEvent>,
    latest: watch::Sender<Option<PvValue>>,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let (latest, _) = watch::channel(None);
        Listeners {
            registry: Default::default(),
            events,
            latest,
        }
    }

    pub(crate) fn add(&self, callback: impl Fn(&PvEvent) + Send + Sync + 'static) -> ListenerId {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(wrapping_inplace_add(&mut registry.next_id));
        registry.callbacks.push((id, Arc::new(callback)));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(i, _)| *i != id);
        registry.callbacks.len() != before
    }

    pub(crate) fn clear(&self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .clear();
    }

    /// Deliver an event to everyone. A panicking callback is logged and skipped.
    pub(crate) fn notify(&self, pv_name: &str, event: PvEvent) {
        let callbacks: Vec<Callback> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                error!("{pv_name}: Listener failed: {}", panic_message(&*panic));
            }
        }
        match &event {
            PvEvent::Value(value) => {
                self.latest.send_replace(Some(value.clone()));
            }
            PvEvent::Disconnected => {
                self.latest.send_replace(None);
            }
            PvEvent::Permissions { .. } => {}
        }
        // Nobody subscribed is not an error
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Option<PvValue>> {
        self.latest.subscribe()
    }

    pub(crate) fn latest(&self) -> Option<PvValue> {
        self.latest.borrow().clone()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Custom error type for `Subscription::recv`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriberRecvError {
    #[error("Channel closed")]
    Closed,
    #[error("Receiver lagged by {0} messages")]
    Lagged(u64),
}

impl From<broadcast::error::RecvError> for SubscriberRecvError {
    fn from(err: broadcast::error::RecvError) -> Self {
        match err {
            broadcast::error::RecvError::Closed => Self::Closed,
            broadcast::error::RecvError::Lagged(n) => Self::Lagged(n),
        }
    }
}

/// Custom error type for `Subscription::try_recv`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriberTryRecvError {
    #[error("No messages outstanding")]
    Empty,
    #[error("Channel closed")]
    Closed,
    #[error("Receiver lagged by {0} messages")]
    Lagged(u64),
}

impl From<broadcast::error::TryRecvError> for SubscriberTryRecvError {
    fn from(err: broadcast::error::TryRecvError) -> Self {
        match err {
            broadcast::error::TryRecvError::Empty => Self::Empty,
            broadcast::error::TryRecvError::Closed => Self::Closed,
            broadcast::error::TryRecvError::Lagged(n) => Self::Lagged(n),
        }
    }
}

/// A stream of [`PvEvent`]s from one PV
///
/// Wraps a `tokio::sync::broadcast::Receiver`; a subscriber that falls too far
/// behind loses the oldest events and is told how many with
/// [`SubscriberRecvError::Lagged`].
pub struct Subscription {
    inner: broadcast::Receiver<PvEvent>,
}

impl Subscription {
    fn new(inner: broadcast::Receiver<PvEvent>) -> Self {
        Self { inner }
    }

    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<PvEvent, SubscriberRecvError> {
        Ok(self.inner.recv().await?)
    }

    /// Receive the next value, skipping connection and permission events.
    pub async fn recv_value(&mut self) -> Result<PvValue, SubscriberRecvError> {
        loop {
            if let PvEvent::Value(value) = self.recv().await? {
                return Ok(value);
            }
        }
    }

    /// Blocking receive for synchronous contexts.
    pub fn blocking_recv(&mut self) -> Result<PvEvent, SubscriberRecvError> {
        Ok(self.inner.blocking_recv()?)
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Result<PvEvent, SubscriberTryRecvError> {
        Ok(self.inner.try_recv()?)
    }

    /// Returns `true` if no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of events currently waiting.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Another subscription to the same PV, starting from now.
    pub fn resubscribe(&self) -> Self {
        Self {
            inner: self.inner.resubscribe(),
        }
    }
}
