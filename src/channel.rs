//! The capabilities a transport has to offer for the PV layer to drive a channel.
//!
//! A [`ChannelProvider`] hands out [`Channel`]s by bare name. Everything below that
//! (circuit management, name search, message framing) is the provider's business.
//! Completions and listener callbacks may be invoked on any thread the transport
//! owns, including re-entrantly from inside the call that started the operation.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    dbr::{Dbr, DbrType, DbrValue},
    error::TransportError,
    messages::{Access, ErrorCondition, MonitorMask},
};

/// One-shot completion for a get or a confirmed put
pub type Completion<T> = Box<dyn FnOnce(Result<T, TransportError>) + Send>;

/// Identity of a subscription, as allocated by whoever requests it
///
/// Callbacks carry the id of the monitor that produced them, so that the
/// requester can tell events from a torn-down subscription apart from events
/// of the one that replaced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MonitorId(u64);

impl MonitorId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Hands out [`MonitorId`]s, unique among everyone sharing the allocator
#[derive(Debug, Default)]
pub struct MonitorIds(AtomicU64);

impl MonitorIds {
    pub fn next(&self) -> MonitorId {
        MonitorId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait ConnectionListener: Send + Sync {
    fn connection_changed(&self, connected: bool);
}

pub trait MonitorListener: Send + Sync {
    fn on_value(&self, monitor: MonitorId, value: Dbr);
    fn on_error(&self, monitor: MonitorId, condition: ErrorCondition, message: &str);
}

/// Handle to a live subscription
pub trait Monitor: Send {
    /// Stop the subscription. No callbacks should be delivered afterwards,
    /// although late ones that were already in flight may still arrive.
    fn destroy(&mut self);
}

pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Register the listener for connection state changes.
    ///
    /// If the channel is already connected the listener is told so right away.
    fn set_connection_listener(&self, listener: Arc<dyn ConnectionListener>);

    fn native_type(&self) -> Result<DbrType, TransportError>;
    /// Element count as declared by the server
    fn native_count(&self) -> Result<usize, TransportError>;
    fn access(&self) -> Result<Access, TransportError>;

    /// Whether the server honours `DBE_PROPERTY` subscriptions
    fn supports_property_events(&self) -> bool {
        true
    }

    /// Read a value once. `count` of `None` asks for the native count.
    fn get(&self, data_type: DbrType, count: Option<usize>, done: Completion<Dbr>);
    /// Write, asking the server to acknowledge completion
    fn put(&self, value: DbrValue, done: Completion<()>);
    /// Write without waiting for or requesting acknowledgement
    fn put_no_confirm(&self, value: DbrValue) -> Result<(), TransportError>;

    fn monitor(
        &self,
        data_type: DbrType,
        count: Option<usize>,
        mask: MonitorMask,
        id: MonitorId,
        listener: Arc<dyn MonitorListener>,
    ) -> Result<Box<dyn Monitor>, TransportError>;

    /// Release the channel and every monitor created from it
    fn destroy(&self);
}

pub trait ChannelProvider: Send + Sync {
    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, TransportError>;
}
