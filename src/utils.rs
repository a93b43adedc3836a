use num::{FromPrimitive, traits::WrappingAdd};
use std::{env, fmt::Display, str::FromStr, time::Duration};
use tracing::warn;

/// Increments a mutable reference in place, and returns the original value
pub(crate) fn wrapping_inplace_add<T: WrappingAdd + FromPrimitive + Copy>(value: &mut T) -> T {
    let id = *value;
    if let Some(one) = T::from_u8(1) {
        *value = value.wrapping_add(&one);
    }
    id
}

/// Parse a setting, warning and returning `None` when it is present but malformed
pub(crate) fn parse_setting<T>(name: &str, value: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring invalid value '{value}' for {name}: {e}");
            None
        }
    }
}

/// Boolean settings accept the usual spellings of yes and no
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Flag(pub bool);

impl FromStr for Flag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Flag(true)),
            "false" | "no" | "0" | "off" => Ok(Flag(false)),
            _ => Err("expected true or false".to_string()),
        }
    }
}

/// Seconds as a timeout of at least 0.1 s, or `None` (with a warning) if out of range
pub(crate) fn timeout_from_secs(name: &str, secs: f32) -> Option<Duration> {
    if secs.is_nan() {
        warn!("Ignoring timeout of {secs} seconds for {name}");
        return None;
    }
    match Duration::try_from_secs_f32(secs.max(0.1)) {
        Ok(timeout) => Some(timeout),
        Err(e) => {
            warn!("Ignoring timeout of {secs} seconds for {name}: {e}");
            None
        }
    }
}

/// Get the connection timeout, either from environment or default 30 seconds
pub fn get_default_connection_timeout() -> Duration {
    parse_setting::<f32>("EPICS_CA_CONN_TMO", env::var("EPICS_CA_CONN_TMO").ok())
        .and_then(|t| timeout_from_secs("EPICS_CA_CONN_TMO", t))
        .unwrap_or(Duration::from_secs(30))
}
