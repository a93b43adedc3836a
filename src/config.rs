//! Preferences shared by every PV created from a [`PvClient`](crate::PvClient).

use std::{env, fmt, str::FromStr, time::Duration};

use crate::{
    messages::MonitorMask,
    utils::{Flag, get_default_connection_timeout, parse_setting, timeout_from_secs},
};

/// What to do when writing a 64-bit integer that does not fit into a CA `LONG`
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LongConversionMode {
    /// Clamp to the nearest 32-bit value
    Coerce,
    #[default]
    CoerceAndWarn,
    /// Send as a double instead
    Convert,
    ConvertAndWarn,
    /// Refuse the write
    Fail,
    /// Keep the low 32 bits
    Truncate,
    TruncateAndWarn,
}

impl LongConversionMode {
    pub fn warns(&self) -> bool {
        matches!(
            self,
            Self::CoerceAndWarn | Self::ConvertAndWarn | Self::TruncateAndWarn
        )
    }
}

impl FromStr for LongConversionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "COERCE" => Self::Coerce,
            "COERCE_AND_WARN" => Self::CoerceAndWarn,
            "CONVERT" => Self::Convert,
            "CONVERT_AND_WARN" => Self::ConvertAndWarn,
            "FAIL" => Self::Fail,
            "TRUNCATE" => Self::Truncate,
            "TRUNCATE_AND_WARN" => Self::TruncateAndWarn,
            _ => return Err(format!("unknown long conversion mode '{s}'")),
        })
    }
}

impl fmt::Display for LongConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coerce => "COERCE",
            Self::CoerceAndWarn => "COERCE_AND_WARN",
            Self::Convert => "CONVERT",
            Self::ConvertAndWarn => "CONVERT_AND_WARN",
            Self::Fail => "FAIL",
            Self::Truncate => "TRUNCATE",
            Self::TruncateAndWarn => "TRUNCATE_AND_WARN",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PvPreferences {
    /// Subscribe to metadata changes with `DBE_PROPERTY`, instead of reading once
    pub dbe_property_supported: bool,
    /// Show floating-point values with precision 0 without fractional digits
    pub honor_zero_precision: bool,
    pub long_conversion_mode: LongConversionMode,
    /// Event classes for value subscriptions
    pub monitor_mask: MonitorMask,
    /// Subscribe to `.RTYP` fields as plain strings, without alarm or timestamp
    pub rtyp_value_only: bool,
    /// Default for [`PvClient::connect_pv`](crate::PvClient::connect_pv)
    pub connection_timeout: Duration,
}

impl Default for PvPreferences {
    fn default() -> Self {
        PvPreferences {
            dbe_property_supported: false,
            honor_zero_precision: true,
            long_conversion_mode: LongConversionMode::default(),
            monitor_mask: MonitorMask::default(),
            rtyp_value_only: false,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl PvPreferences {
    /// Read preferences from `EPICS_PV_*` environment variables
    ///
    /// Unset variables keep their defaults; malformed ones are warned about and
    /// ignored. Unless `EPICS_PV_CONNECTION_TIMEOUT` is given, the connection
    /// timeout follows `EPICS_CA_CONN_TMO`.
    pub fn from_env() -> Self {
        let mut preferences = Self::from_lookup(|name| env::var(name).ok());
        if env::var("EPICS_PV_CONNECTION_TIMEOUT").is_err() {
            preferences.connection_timeout = get_default_connection_timeout();
        }
        preferences
    }

    /// Build preferences from any source of `EPICS_PV_*` settings
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| {
            parse_setting::<Flag>(name, lookup(name))
                .map(|f| f.0)
                .unwrap_or(default)
        };
        PvPreferences {
            dbe_property_supported: flag(
                "EPICS_PV_DBE_PROPERTY_SUPPORTED",
                defaults.dbe_property_supported,
            ),
            honor_zero_precision: flag(
                "EPICS_PV_HONOR_ZERO_PRECISION",
                defaults.honor_zero_precision,
            ),
            long_conversion_mode: parse_setting(
                "EPICS_PV_LONG_CONVERSION_MODE",
                lookup("EPICS_PV_LONG_CONVERSION_MODE"),
            )
            .unwrap_or(defaults.long_conversion_mode),
            monitor_mask: parse_setting("EPICS_PV_MONITOR_MASK", lookup("EPICS_PV_MONITOR_MASK"))
                .unwrap_or(defaults.monitor_mask),
            rtyp_value_only: flag("EPICS_PV_RTYP_VALUE_ONLY", defaults.rtyp_value_only),
            connection_timeout: parse_setting::<f32>(
                "EPICS_PV_CONNECTION_TIMEOUT",
                lookup("EPICS_PV_CONNECTION_TIMEOUT"),
            )
            .and_then(|t| timeout_from_secs("EPICS_PV_CONNECTION_TIMEOUT", t))
            .unwrap_or(defaults.connection_timeout),
        }
    }
}
