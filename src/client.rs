use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    channel::{ChannelProvider, MonitorIds},
    config::PvPreferences,
    error::{PvError, Result},
    pv::Pv,
};

/// Creates [`Pv`]s on top of a transport
///
/// A client is explicitly constructed around the [`ChannelProvider`] it should use,
/// so that several independent clients (e.g. one per test, with a fake transport)
/// can coexist in one process.
#[derive(Clone)]
pub struct PvClient {
    provider: Arc<dyn ChannelProvider>,
    preferences: PvPreferences,
    /// Shared by all PVs of this client, which may share channels
    monitor_ids: Arc<MonitorIds>,
}

impl PvClient {
    pub fn new(provider: Arc<dyn ChannelProvider>, preferences: PvPreferences) -> Self {
        Self {
            provider,
            preferences,
            monitor_ids: Default::default(),
        }
    }

    /// A client with preferences read from the environment
    pub fn from_env(provider: Arc<dyn ChannelProvider>) -> Self {
        Self::new(provider, PvPreferences::from_env())
    }

    pub fn preferences(&self) -> &PvPreferences {
        &self.preferences
    }

    /// Create a PV. It connects in the background, whenever the channel does.
    pub fn create_pv(&self, name: &str) -> Result<Pv> {
        Pv::new(
            name,
            self.provider.as_ref(),
            self.monitor_ids.clone(),
            self.preferences.clone(),
        )
    }

    /// Create a PV and wait until it has delivered its first value
    ///
    /// If that takes longer than `timeout`, the PV is closed again and
    /// [`PvError::Timeout`] returned.
    pub async fn connect_pv(&self, name: &str, timeout: Duration) -> Result<Pv> {
        let pv = self.create_pv(name)?;
        let mut latest = pv.watch();
        match tokio::time::timeout(timeout, latest.wait_for(Option::is_some)).await {
            Ok(Ok(_)) => {
                debug!("{name}: Connected");
                Ok(pv)
            }
            Ok(Err(_)) => {
                pv.close();
                Err(PvError::Closed)
            }
            Err(_) => {
                warn!("{name}: No value within {timeout:?}");
                pv.close();
                Err(PvError::Timeout(name.to_string()))
            }
        }
    }

    /// [`connect_pv`](Self::connect_pv) with the configured connection timeout
    pub async fn connect(&self, name: &str) -> Result<Pv> {
        self.connect_pv(name, self.preferences.connection_timeout)
            .await
    }
}
