// #![warn(missing_docs)]

//! Process-variable client layer for the EPICS Channel Access protocol.
//!
//! This crate sits between an application and a CA transport. Given a channel
//! from the transport, a [`Pv`] follows its connection state, keeps a
//! subscription to the time-stamped value and to the descriptive metadata
//! (units, limits, precision, enum labels), and merges both into one
//! [`PvValue`] that is handed to listeners. It also offers reads and writes,
//! where writes can be confirmed by the server or not, per PV.
//!
//! <div class="warning">This is a very early version of this library. Interfaces or
//! structure may be changed around wildly between versions until a comfortable
//! final design is settled upon.</div>
//!
//! The crate is separated into:
//!
//! - The vocabulary shared with a transport in module [messages]: status codes,
//!   event masks and access rights.
//! - Representing data transferred via CA (["DBR" types]) in module [dbr], with the
//!   metadata of all categories.
//! - The [`channel`] traits a transport implements for the PV layer to use.
//! - PV names with embedded options, in module [name]:
//!   `SOME:PV {"putCallback": true}`.
//! - [`PvClient`], which creates [`Pv`]s with a set of [`PvPreferences`].
//!
//! ## Example
//!
//! ```no_run
//! # use std::{sync::Arc, time::Duration};
//! use epicars_pv::{PvClient, PvEvent, PvPreferences, channel::ChannelProvider};
//!
//! async fn follow(provider: Arc<dyn ChannelProvider>) -> epicars_pv::Result<()> {
//!     let client = PvClient::new(provider, PvPreferences::from_env());
//!     let pv = client
//!         .connect_pv(r#"IOC:TEMPERATURE {"putCallback": true}"#, Duration::from_secs(5))
//!         .await?;
//!     pv.add_listener(|event| {
//!         if let PvEvent::Value(value) = event {
//!             println!("Now {:?} ({:?})", value.as_f64(), value.alarm.severity);
//!         }
//!     });
//!     pv.write_async(21.5f64).await?;
//!     Ok(())
//! }
//! ```
//!
//! ["DBR" types]:
//!     https://docs.epics-controls.org/en/latest/internal/ca_protocol.html#payload-data-types

pub mod channel;
mod client;
pub mod config;
pub mod convert;
pub mod dbr;
mod error;
pub mod messages;
pub mod name;
mod pv;
mod utils;
pub mod value;

pub use crate::client::PvClient;
pub use crate::config::{LongConversionMode, PvPreferences};
pub use crate::error::{ConvertError, PvError, Result, TransportError};
pub use crate::name::{PutCallback, PvNameOptions};
pub use crate::pv::{
    ListenerId, Pv, PvEvent, SubscriberRecvError, SubscriberTryRecvError, Subscription,
    WriteOutcome,
};
pub use crate::value::{PvValue, WriteValue};
