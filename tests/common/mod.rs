#![allow(dead_code)]

//! An in-memory transport that tests drive by hand.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, UNIX_EPOCH},
};

use epicars_pv::{
    TransportError,
    channel::{
        Channel, ChannelProvider, Completion, ConnectionListener, Monitor, MonitorId,
        MonitorListener,
    },
    dbr::{Dbr, DbrControl, DbrGraphics, DbrType, DbrValue, Limits, Status},
    messages::{Access, MonitorMask},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::TestWriter;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_writer(TestWriter::new())
        .try_init();
}

#[derive(Default)]
pub struct FakeProvider {
    channels: Mutex<HashMap<String, Arc<FakeChannel>>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    /// The channel handed out for `name`, if any
    pub fn get(&self, name: &str) -> Option<Arc<FakeChannel>> {
        self.channels.lock().unwrap().get(name).cloned()
    }
}

impl ChannelProvider for FakeProvider {
    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, TransportError> {
        let channel: Arc<dyn Channel> = self
            .channels
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(FakeChannel::new(name)))
            .clone();
        Ok(channel)
    }
}

/// What the fake knows about a monitor it created
#[derive(Clone)]
pub struct MonitorRecord {
    pub id: MonitorId,
    pub data_type: DbrType,
    pub count: Option<usize>,
    pub mask: MonitorMask,
    pub listener: Arc<dyn MonitorListener>,
    alive: Arc<AtomicBool>,
}

impl MonitorRecord {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub struct PendingGet {
    pub data_type: DbrType,
    pub count: Option<usize>,
    pub done: Completion<Dbr>,
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    destroyed: bool,
    native_type: Option<DbrType>,
    native_count: usize,
    access: Access,
    no_property_events: bool,
    fail_monitors: bool,
    listener: Option<Arc<dyn ConnectionListener>>,
    monitors: Vec<MonitorRecord>,
    gets: Vec<PendingGet>,
    puts: Vec<(DbrValue, Completion<()>)>,
    unconfirmed: Vec<DbrValue>,
}

pub struct FakeChannel {
    name: String,
    state: Mutex<FakeState>,
}

struct FakeMonitor(Arc<AtomicBool>);

impl Monitor for FakeMonitor {
    fn destroy(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FakeChannel {
    fn new(name: &str) -> Self {
        FakeChannel {
            name: name.to_string(),
            state: Default::default(),
        }
    }

    pub fn connect(&self, native_type: &str, count: usize, access: Access) {
        let listener = {
            let mut state = self.state.lock().unwrap();
            state.connected = true;
            state.native_type = Some(native_type.parse().unwrap());
            state.native_count = count;
            state.access = access;
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.connection_changed(true);
        }
    }

    pub fn disconnect(&self) {
        let listener = {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.connection_changed(false);
        }
    }

    pub fn set_property_events(&self, supported: bool) {
        self.state.lock().unwrap().no_property_events = !supported;
    }

    pub fn fail_monitors(&self, fail: bool) {
        self.state.lock().unwrap().fail_monitors = fail;
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    /// Every monitor created on this channel, in creation order
    pub fn monitors(&self) -> Vec<MonitorRecord> {
        self.state.lock().unwrap().monitors.clone()
    }

    pub fn live_monitors(&self) -> Vec<MonitorRecord> {
        self.monitors().into_iter().filter(|m| m.is_alive()).collect()
    }

    /// The live monitor subscribed to `data_type`
    pub fn monitor_for(&self, data_type: &str) -> MonitorRecord {
        let data_type: DbrType = data_type.parse().unwrap();
        self.live_monitors()
            .into_iter()
            .find(|m| m.data_type == data_type)
            .unwrap_or_else(|| panic!("No live monitor for {data_type}"))
    }

    /// Deliver a value on a monitor, whether or not it was destroyed
    pub fn emit(&self, monitor: &MonitorRecord, value: Dbr) {
        monitor.listener.on_value(monitor.id, value);
    }

    pub fn take_get(&self) -> Option<PendingGet> {
        let mut state = self.state.lock().unwrap();
        if state.gets.is_empty() {
            None
        } else {
            Some(state.gets.remove(0))
        }
    }

    pub fn pending_gets(&self) -> usize {
        self.state.lock().unwrap().gets.len()
    }

    pub fn take_put(&self) -> Option<(DbrValue, Completion<()>)> {
        let mut state = self.state.lock().unwrap();
        if state.puts.is_empty() {
            None
        } else {
            Some(state.puts.remove(0))
        }
    }

    pub fn pending_puts(&self) -> usize {
        self.state.lock().unwrap().puts.len()
    }

    pub fn unconfirmed_puts(&self) -> Vec<DbrValue> {
        self.state.lock().unwrap().unconfirmed.clone()
    }
}

impl Channel for FakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        let connected = {
            let mut state = self.state.lock().unwrap();
            state.listener = Some(listener.clone());
            state.connected
        };
        if connected {
            listener.connection_changed(true);
        }
    }

    fn native_type(&self) -> Result<DbrType, TransportError> {
        let state = self.state.lock().unwrap();
        match state.native_type {
            Some(t) if state.connected => Ok(t),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn native_count(&self) -> Result<usize, TransportError> {
        let state = self.state.lock().unwrap();
        if state.connected {
            Ok(state.native_count)
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn access(&self) -> Result<Access, TransportError> {
        let state = self.state.lock().unwrap();
        if state.connected {
            Ok(state.access)
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn supports_property_events(&self) -> bool {
        !self.state.lock().unwrap().no_property_events
    }

    fn get(&self, data_type: DbrType, count: Option<usize>, done: Completion<Dbr>) {
        let mut state = self.state.lock().unwrap();
        if state.destroyed {
            drop(state);
            done(Err(TransportError::Destroyed));
            return;
        }
        state.gets.push(PendingGet {
            data_type,
            count,
            done,
        });
    }

    fn put(&self, value: DbrValue, done: Completion<()>) {
        self.state.lock().unwrap().puts.push((value, done));
    }

    fn put_no_confirm(&self, value: DbrValue) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.unconfirmed.push(value);
        Ok(())
    }

    fn monitor(
        &self,
        data_type: DbrType,
        count: Option<usize>,
        mask: MonitorMask,
        id: MonitorId,
        listener: Arc<dyn MonitorListener>,
    ) -> Result<Box<dyn Monitor>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_monitors && !state.monitors.is_empty() {
            return Err(TransportError::NotConnected);
        }
        let alive = Arc::new(AtomicBool::new(true));
        state.monitors.push(MonitorRecord {
            id,
            data_type,
            count,
            mask,
            listener,
            alive: alive.clone(),
        });
        Ok(Box::new(FakeMonitor(alive)))
    }

    fn destroy(&self) {
        let mut state = self.state.lock().unwrap();
        state.destroyed = true;
        for monitor in &state.monitors {
            monitor.alive.store(false, Ordering::SeqCst);
        }
    }
}

pub fn status(severity: i16) -> Status {
    Status {
        status: if severity == 0 { 0 } else { 3 },
        severity,
    }
}

pub fn time_value(value: impl Into<DbrValue>, secs: u64) -> Dbr {
    Dbr::Time {
        status: status(0),
        timestamp: UNIX_EPOCH + Duration::from_secs(secs),
        value: value.into(),
    }
}

pub fn ctrl_double(units: &str, precision: i16) -> Dbr {
    Dbr::Control {
        status: status(0),
        graphics: DbrGraphics::Double {
            units: units.to_string(),
            limits: Limits {
                display_limits: (0.0, 100.0),
                alarm_limits: (5.0, 95.0),
                warning_limits: (10.0, 90.0),
            },
            precision,
        },
        control: DbrControl::Double(0.0, 50.0),
        value: 0.0f64.into(),
    }
}

pub fn ctrl_enum(labels: &[&str]) -> Dbr {
    Dbr::Control {
        status: status(0),
        graphics: DbrGraphics::Enum {
            labels: labels.iter().map(|s| s.to_string()).collect(),
        },
        control: DbrControl::Enum,
        value: DbrValue::Enum(vec![0]),
    }
}
