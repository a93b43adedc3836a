//! Combining the time-value and metadata streams of a PV.
//!
//! Each callback first checks that it comes from the subscription currently
//! registered for its kind; anything else is left over from an earlier
//! connection and is dropped. Whichever of the two values completes the pair
//! triggers the first notification.

use std::sync::{Arc, Weak};

use tracing::{trace, warn};

use super::{PvEvent, PvInner};
use crate::{
    channel::{MonitorId, MonitorListener},
    convert::to_pv_value,
    dbr::Dbr,
    messages::ErrorCondition,
    value::PvValue,
};

/// Listener for the time-stamped value subscription
pub(super) struct TimeListener(pub(super) Weak<PvInner>);

/// Listener for the metadata subscription
pub(super) struct MetadataListener(pub(super) Weak<PvInner>);

impl MonitorListener for TimeListener {
    fn on_value(&self, monitor: MonitorId, value: Dbr) {
        if let Some(inner) = self.0.upgrade() {
            inner.time_event(monitor, value);
        }
    }
    fn on_error(&self, monitor: MonitorId, condition: ErrorCondition, message: &str) {
        if let Some(inner) = self.0.upgrade() {
            inner.time_error(monitor, &format!("{condition}: {message}"));
        }
    }
}

impl MonitorListener for MetadataListener {
    fn on_value(&self, monitor: MonitorId, value: Dbr) {
        if let Some(inner) = self.0.upgrade() {
            inner.metadata_event(monitor, value);
        }
    }
    fn on_error(&self, monitor: MonitorId, condition: ErrorCondition, message: &str) {
        if let Some(inner) = self.0.upgrade() {
            inner.metadata_error(monitor, &format!("{condition}: {message}"));
        }
    }
}

impl PvInner {
    pub(super) fn time_event(&self, monitor: MonitorId, value: Dbr) {
        // Plain values only arrive on the special-cased RTYP subscription
        if !matches!(value, Dbr::Time { .. } | Dbr::Basic(_)) {
            self.time_error(
                monitor,
                &format!("received a value of the unexpected type {}", value.data_type()),
            );
            return;
        }
        let value = Arc::new(value);
        let (metadata, metadata_expected) = {
            let mut state = self.lock_state();
            if !state.is_active_time(monitor) {
                trace!("{}: Ignoring value from stale monitor {monitor}", self.name);
                return;
            }
            state.last_time = Some(value.clone());
            // Metadata for another basic type cannot complete the pair
            let metadata = state
                .last_metadata
                .clone()
                .filter(|m| m.value().get_type() == value.value().get_type());
            (metadata, state.metadata_expected)
        };
        trace!("{}: Received time value {value:?}", self.name);
        if metadata.is_some() || !metadata_expected {
            self.notify_value(metadata.as_deref(), &value);
        }
    }

    pub(super) fn metadata_event(&self, monitor: MonitorId, value: Dbr) {
        let value = Arc::new(value);
        let time = {
            let mut state = self.lock_state();
            if !state.is_active_metadata(monitor) {
                trace!("{}: Ignoring metadata from stale source {monitor}", self.name);
                return;
            }
            if let Some(time) = &state.last_time
                && time.value().get_type() != value.value().get_type()
            {
                warn!(
                    "{}: Ignoring metadata {} that does not match value type {}",
                    self.name,
                    value.data_type(),
                    time.data_type()
                );
                return;
            }
            state.last_metadata = Some(value.clone());
            state.last_time.clone()
        };
        trace!("{}: Received metadata {value:?}", self.name);
        if let Some(time) = time {
            self.notify_value(Some(&*value), &time);
        }
    }

    pub(super) fn time_error(&self, monitor: MonitorId, message: &str) {
        if !self.lock_state().is_active_time(monitor) {
            return;
        }
        warn!("{}: Monitor for time-stamped values raised an error: {message}", self.name);
    }

    pub(super) fn metadata_error(&self, monitor: MonitorId, message: &str) {
        if !self.lock_state().is_active_metadata(monitor) {
            return;
        }
        warn!("{}: Fetching metadata failed: {message}", self.name);
    }

    /// Merge a completed read with whatever metadata is cached
    ///
    /// Listeners only hear about the result when the merged value is complete,
    /// i.e. when metadata is present or none is expected. A read that completes
    /// while no connection is established is returned to the reader only.
    pub(super) fn read_completed(&self, value: Dbr, force_array: bool) -> PvValue {
        let value = Arc::new(value);
        let (metadata, metadata_expected) = {
            let mut state = self.lock_state();
            if state.time_monitor.is_none() {
                drop(state);
                trace!("{}: Read completed while disconnected", self.name);
                return to_pv_value(None, &value, self.convert_options(force_array));
            }
            let metadata = state
                .last_metadata
                .clone()
                .filter(|m| m.value().get_type() == value.value().get_type());
            if metadata.is_some() || state.last_metadata.is_none() {
                state.last_time = Some(value.clone());
            }
            (metadata, state.metadata_expected)
        };
        let merged = to_pv_value(
            metadata.as_deref(),
            &value,
            self.convert_options(force_array),
        );
        if metadata.is_some() || !metadata_expected {
            self.notify(PvEvent::Value(merged.clone()));
        }
        merged
    }

    fn notify_value(&self, metadata: Option<&Dbr>, value: &Dbr) {
        // Disconnected in the meantime, the disconnect notification will follow
        let Ok(count) = self.channel.native_count() else {
            return;
        };
        let merged = to_pv_value(metadata, value, self.convert_options(count != 1));
        self.notify(PvEvent::Value(merged));
    }
}
