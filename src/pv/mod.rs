//! A process variable: one channel, its subscriptions, and the merged value.
//!
//! On every connection a [`Pv`] subscribes to the time-stamped value of its
//! channel and, for types that have any, fetches or subscribes to the controls
//! metadata (units, limits, precision, enum labels). The two streams arrive
//! independently; listeners are first notified once both are in, and after that on
//! every change of either. See [`Pv::add_listener`] and [`Pv::subscribe`].

mod connection;
mod listeners;
mod merge;

use std::{
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
};

use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

pub use self::listeners::{
    ListenerId, PvEvent, SubscriberRecvError, SubscriberTryRecvError, Subscription,
};
use self::listeners::Listeners;
use crate::{
    channel::{Channel, ChannelProvider, Monitor, MonitorId, MonitorIds},
    config::PvPreferences,
    convert::{ConvertOptions, to_dbr_value},
    dbr::{Dbr, DbrValue},
    error::{PvError, Result},
    name::{PutCallback, parse_name},
    value::{PvValue, WriteValue},
};

/// How a blocking [`Pv::write`] ended
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Handed to the transport without asking for confirmation
    Sent,
    /// The server confirmed the write
    Confirmed,
    /// The transport dropped the request before it was confirmed. The write may
    /// or may not have happened.
    Interrupted,
}

/// A subscription slot and, once the transport handed one out, its handle
pub(crate) struct ActiveMonitor {
    id: MonitorId,
    handle: Option<Box<dyn Monitor>>,
}

impl ActiveMonitor {
    fn pending(id: MonitorId) -> Self {
        ActiveMonitor { id, handle: None }
    }

    fn destroy(self) {
        if let Some(mut handle) = self.handle {
            handle.destroy();
        }
    }
}

/// Everything the connection handler and the monitor callbacks share
#[derive(Default)]
pub(crate) struct MergeState {
    time_monitor: Option<ActiveMonitor>,
    /// A metadata monitor, or the one-shot metadata read standing in for one
    metadata_source: Option<ActiveMonitor>,
    last_metadata: Option<Arc<Dbr>>,
    last_time: Option<Arc<Dbr>>,
    metadata_expected: bool,
}

impl MergeState {
    fn is_active_time(&self, id: MonitorId) -> bool {
        self.time_monitor.as_ref().is_some_and(|m| m.id == id)
    }
    fn is_active_metadata(&self, id: MonitorId) -> bool {
        self.metadata_source.as_ref().is_some_and(|m| m.id == id)
    }
    /// Forget both subscriptions and both cached values
    fn reset(&mut self) -> [Option<ActiveMonitor>; 2] {
        self.last_metadata = None;
        self.last_time = None;
        self.metadata_expected = false;
        [self.time_monitor.take(), self.metadata_source.take()]
    }
}

pub(crate) struct PvInner {
    name: String,
    channel_name: String,
    long_string: bool,
    put_callback: PutCallback,
    preferences: PvPreferences,
    channel: Arc<dyn Channel>,
    monitor_ids: Arc<MonitorIds>,
    state: Mutex<MergeState>,
    listeners: Listeners,
    read_only: AtomicBool,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl PvInner {
    fn lock_state(&self) -> MutexGuard<'_, MergeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn convert_options(&self, force_array: bool) -> ConvertOptions {
        ConvertOptions {
            force_array,
            honor_zero_precision: self.preferences.honor_zero_precision,
            long_string: self.long_string,
        }
    }

    fn notify(&self, event: PvEvent) {
        self.listeners.notify(&self.name, event);
    }

    fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
        self.notify(PvEvent::Permissions { read_only });
    }

    fn to_dbr_value(&self, value: WriteValue) -> Result<DbrValue> {
        Ok(to_dbr_value(
            &self.channel_name,
            value,
            self.long_string,
            self.preferences.long_conversion_mode,
        )?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PvError::Closed)
        } else {
            Ok(())
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("{}: Closing PV", self.name);
        self.channel.destroy();
        // Destroying the channel took the monitors with it
        drop(self.lock_state().reset());
        self.connected.store(false, Ordering::SeqCst);
        self.read_only.store(true, Ordering::SeqCst);
        self.listeners.clear();
    }
}

/// Handle to a process variable
///
/// Dropping the handle closes the PV. Share it behind an [`Arc`] if several
/// owners need it.
pub struct Pv {
    inner: Arc<PvInner>,
}

impl Pv {
    pub(crate) fn new(
        name: &str,
        provider: &dyn ChannelProvider,
        monitor_ids: Arc<MonitorIds>,
        preferences: PvPreferences,
    ) -> Result<Pv> {
        let parsed = parse_name(name);
        debug!(
            "{name}: Creating PV for channel {} (long string: {}, put callback: {:?})",
            parsed.channel_name, parsed.long_string, parsed.put_callback
        );
        let channel = provider.channel(&parsed.channel_name)?;
        let inner = Arc::new(PvInner {
            name: name.to_string(),
            channel_name: parsed.channel_name,
            long_string: parsed.long_string,
            put_callback: parsed.put_callback,
            preferences,
            channel,
            monitor_ids,
            state: Default::default(),
            listeners: Listeners::new(),
            // Until the server says otherwise
            read_only: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        connection::attach(&inner);
        Ok(Pv { inner })
    }

    /// The name as requested, including any options
    pub fn name(&self) -> &str {
        &self.inner.name
    }
    /// The channel name, with options removed
    pub fn channel_name(&self) -> &str {
        &self.inner.channel_name
    }
    pub fn is_long_string(&self) -> bool {
        self.inner.long_string
    }
    pub fn put_callback(&self) -> PutCallback {
        self.inner.put_callback
    }
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.load(Ordering::SeqCst)
    }

    /// Call `listener` for every event of this PV
    ///
    /// Listeners run on transport threads and must not block. A panic inside a
    /// listener is logged and does not affect other listeners.
    pub fn add_listener(
        &self,
        listener: impl Fn(&PvEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Returns whether the listener was still registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Receive events of this PV through a channel
    pub fn subscribe(&self) -> Subscription {
        self.inner.listeners.subscribe()
    }

    /// The most recent merged value, or `None` before the first one or after a disconnect
    pub fn latest(&self) -> Option<PvValue> {
        self.inner.listeners.latest()
    }

    /// Watch the most recent merged value
    pub fn watch(&self) -> watch::Receiver<Option<PvValue>> {
        self.inner.listeners.watch()
    }

    /// Read the current value from the server
    ///
    /// The request is sent immediately; the returned future resolves when the
    /// server replies. Cached metadata is merged into the result.
    pub fn read(&self) -> impl Future<Output = Result<PvValue>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        if let Err(e) = self.start_read(reply) {
            let (reply, failed) = oneshot::channel();
            let _ = reply.send(Err(e));
            return Self::wait_for_reply(failed);
        }
        Self::wait_for_reply(response)
    }

    async fn wait_for_reply<T: Send>(
        response: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        response.await.map_err(|_| PvError::Abandoned)?
    }

    fn start_read(&self, reply: oneshot::Sender<Result<PvValue>>) -> Result<()> {
        self.inner.ensure_open()?;
        let native_type = self.inner.channel.native_type()?;
        let force_array = self.inner.channel.native_count()? != 1;
        let time_type = self
            .inner
            .time_type_for(native_type)
            .ok_or(PvError::NoTimeType(native_type))?;
        debug!("{}: Reading as {time_type}", self.inner.name);
        let weak = Arc::downgrade(&self.inner);
        self.inner.channel.get(
            time_type,
            None,
            Box::new(move |result| {
                let result = match (result, weak.upgrade()) {
                    (Ok(value), Some(inner)) => Ok(inner.read_completed(value, force_array)),
                    (Ok(_), None) => Err(PvError::Closed),
                    (Err(e), _) => Err(e.into()),
                };
                let _ = reply.send(result);
            }),
        );
        Ok(())
    }

    /// Write a value
    ///
    /// Unless the PV name asked for `"putCallback": true`, this hands the value to
    /// the transport and returns. With put callback enabled, this blocks the
    /// calling thread until the server confirms the write, so it must not be
    /// called from within an async task.
    pub fn write(&self, value: impl Into<WriteValue>) -> Result<WriteOutcome> {
        self.inner.ensure_open()?;
        let value = self.inner.to_dbr_value(value.into())?;
        match self.inner.put_callback {
            PutCallback::No | PutCallback::Auto => {
                self.inner.channel.put_no_confirm(value)?;
                Ok(WriteOutcome::Sent)
            }
            PutCallback::Yes => {
                let (tx, rx) = mpsc::sync_channel(1);
                self.inner.channel.put(
                    value,
                    Box::new(move |result| {
                        let _ = tx.send(result);
                    }),
                );
                match rx.recv() {
                    Ok(result) => {
                        result?;
                        Ok(WriteOutcome::Confirmed)
                    }
                    Err(_) => {
                        warn!("{}: Write was abandoned before confirmation", self.inner.name);
                        Ok(WriteOutcome::Interrupted)
                    }
                }
            }
        }
    }

    /// Write a value, resolving once the write is complete
    ///
    /// Unless the PV name asked for `"putCallback": false`, completion means the
    /// server confirmed the write. Otherwise the write is sent right away and the
    /// returned future is already complete.
    pub fn write_async(
        &self,
        value: impl Into<WriteValue>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        match self.inner.put_callback {
            PutCallback::Yes | PutCallback::Auto => {
                if let Err(e) = self.start_confirmed_write(value.into(), reply) {
                    let (reply, failed) = oneshot::channel();
                    let _ = reply.send(Err(e));
                    return Self::wait_for_reply(failed);
                }
            }
            PutCallback::No => {
                let _ = reply.send(self.write(value).map(|_| ()));
            }
        }
        Self::wait_for_reply(response)
    }

    fn start_confirmed_write(
        &self,
        value: WriteValue,
        reply: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        let value = self.inner.to_dbr_value(value)?;
        self.inner.channel.put(
            value,
            Box::new(move |result| {
                let _ = reply.send(result.map_err(PvError::from));
            }),
        );
        Ok(())
    }

    /// Release the channel and its subscriptions. Listeners are dropped.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for Pv {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Pv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pv")
            .field("name", &self.inner.name)
            .field("connected", &self.is_connected())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}
