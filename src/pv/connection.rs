use std::sync::{Arc, Weak, atomic::Ordering};

use tracing::{debug, debug_span, error, warn};

use super::{
    ActiveMonitor, PvEvent, PvInner,
    merge::{MetadataListener, TimeListener},
};
use crate::{
    channel::{ConnectionListener, Monitor, MonitorId},
    dbr::{DbrBasicType, DbrCategory, DbrType},
    messages::MonitorMask,
};

/// Which subscription slot a handle belongs in
#[derive(Debug, Copy, Clone)]
enum Slot {
    Time,
    Metadata,
}

struct ConnectionHandler(Weak<PvInner>);

impl ConnectionListener for ConnectionHandler {
    fn connection_changed(&self, connected: bool) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        if connected {
            inner.handle_connected();
        } else {
            inner.handle_disconnected();
        }
    }
}

/// Start following the connection state of the PV's channel
pub(super) fn attach(inner: &Arc<PvInner>) {
    inner
        .channel
        .set_connection_listener(Arc::new(ConnectionHandler(Arc::downgrade(inner))));
}

impl PvInner {
    /// Metadata worth requesting for a native type, if any
    pub(super) fn controls_type_for(&self, native_type: DbrType) -> Option<DbrType> {
        match native_type.basic_type {
            DbrBasicType::String => None,
            DbrBasicType::Char if self.long_string => None,
            _ => native_type.controls_type(),
        }
    }

    /// The type to subscribe to for values
    pub(super) fn time_type_for(&self, native_type: DbrType) -> Option<DbrType> {
        if self.preferences.rtyp_value_only
            && native_type.basic_type == DbrBasicType::String
            && self.channel_name.ends_with(".RTYP")
        {
            return Some(DbrType::new(DbrBasicType::String, DbrCategory::Basic));
        }
        native_type.time_type()
    }

    fn handle_connected(self: &Arc<Self>) {
        let _span = debug_span!("connect", pv = %self.name).entered();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // The channel can be destroyed underneath us, in which case these fail
        let (access, native_type) = match (self.channel.access(), self.channel.native_type()) {
            (Ok(access), Ok(native_type)) => (access, native_type),
            (Err(e), _) | (_, Err(e)) => {
                debug!("{}: Abandoning connection handling: {e}", self.name);
                return;
            }
        };
        debug!("{}: Connected with native type {native_type}", self.name);
        self.connected.store(true, Ordering::SeqCst);
        self.set_read_only(!access.can_write());

        let controls_type = self.controls_type_for(native_type);
        let Some(time_type) = self.time_type_for(native_type) else {
            error!(
                "{}: Native type {native_type} has no time-stamped variant, staying disconnected",
                self.name
            );
            self.connected.store(false, Ordering::SeqCst);
            self.set_read_only(true);
            return;
        };

        let time_id = self.monitor_ids.next();
        let metadata_id = controls_type.map(|_| self.monitor_ids.next());
        // Register the identities before anything can call back with them
        let leftovers = {
            let mut state = self.lock_state();
            let leftovers = state.reset();
            state.metadata_expected = controls_type.is_some();
            state.time_monitor = Some(ActiveMonitor::pending(time_id));
            state.metadata_source = metadata_id.map(ActiveMonitor::pending);
            leftovers
        };
        for monitor in leftovers.into_iter().flatten() {
            monitor.destroy();
        }

        let time_monitor = match self.channel.monitor(
            time_type,
            None,
            self.preferences.monitor_mask,
            time_id,
            Arc::new(TimeListener(Arc::downgrade(self))),
        ) {
            Ok(monitor) => monitor,
            Err(e) => {
                warn!("{}: Could not subscribe to {time_type}: {e}", self.name);
                self.abandon_cycle(time_id);
                return;
            }
        };
        if !self.install(Slot::Time, time_id, time_monitor) {
            return;
        }

        let (Some(controls_type), Some(metadata_id)) = (controls_type, metadata_id) else {
            return;
        };
        if self.preferences.dbe_property_supported && self.channel.supports_property_events() {
            match self.channel.monitor(
                controls_type,
                Some(1),
                MonitorMask::PROPERTY,
                metadata_id,
                Arc::new(MetadataListener(Arc::downgrade(self))),
            ) {
                Ok(monitor) => {
                    self.install(Slot::Metadata, metadata_id, monitor);
                }
                Err(e) => {
                    warn!("{}: Could not subscribe to {controls_type}: {e}", self.name);
                    self.abandon_cycle(time_id);
                }
            }
        } else {
            let weak = Arc::downgrade(self);
            self.channel.get(
                controls_type,
                Some(1),
                Box::new(move |result| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    match result {
                        Ok(value) => inner.metadata_event(metadata_id, value),
                        Err(e) => inner.metadata_error(metadata_id, &e.to_string()),
                    }
                }),
            );
        }
    }

    /// Store a freshly created monitor handle in its slot
    ///
    /// If the slot moved on while the monitor was being created (a disconnect,
    /// or the PV closing) the handle is destroyed instead, and `false` returned.
    fn install(&self, slot: Slot, id: MonitorId, mut handle: Box<dyn Monitor>) -> bool {
        {
            let mut state = self.lock_state();
            let active = match slot {
                Slot::Time => state.time_monitor.as_mut(),
                Slot::Metadata => state.metadata_source.as_mut(),
            };
            if let Some(active) = active.filter(|m| m.id == id) {
                active.handle = Some(handle);
                return true;
            }
        }
        debug!("{}: {slot:?} monitor {id} was superseded during creation", self.name);
        handle.destroy();
        false
    }

    /// Undo everything the connection cycle identified by `time_id` set up
    ///
    /// The PV is left disconnected and read-only.
    fn abandon_cycle(&self, time_id: MonitorId) {
        let taken = {
            let mut state = self.lock_state();
            if !state.is_active_time(time_id) {
                return;
            }
            state.reset()
        };
        for monitor in taken.into_iter().flatten() {
            monitor.destroy();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.set_read_only(true);
    }

    fn handle_disconnected(&self) {
        let _span = debug_span!("disconnect", pv = %self.name).entered();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        debug!("{}: Disconnected", self.name);
        // Cached values must not leak into the next connection
        let taken = self.lock_state().reset();
        for monitor in taken.into_iter().flatten() {
            monitor.destroy();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.notify(PvEvent::Disconnected);
        self.set_read_only(true);
    }
}
