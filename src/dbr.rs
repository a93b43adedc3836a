//! Represent CA DBR representations, as received from and sent to a channel.
//!
//! CA defines thirty-five [DBR] kinds as special structures used to transfer data back
//! and forth. These can be broken down into seven basic array types, which define the
//! data, and five categories of attached metadata. This module models this from the
//! point of view of a client: the values that arrive on subscriptions and reads, the
//! metadata ("controls") structures used to describe a channel, and the plain values
//! that are written back.
//!
//! The basic types are enumerated in [`DbrBasicType`] and are represented in
//! [`DbrValue`]:
//! - [`DbrValue::Char`] ([`Vec<i8>`]). Long strings travel as char arrays.
//! - [`DbrValue::Int`] ([`Vec<i16>`]), called `SHORT` by most tools.
//! - [`DbrValue::Long`] ([`Vec<i32>`])
//! - [`DbrValue::Float`] ([`Vec<f32>`])
//! - [`DbrValue::Double`] ([`Vec<f64>`])
//! - [`DbrValue::Enum`] ([`Vec<u16>`]), indices into the labels carried by the
//!   [`DbrGraphics::Enum`] metadata.
//! - [`DbrValue::String`] - natively a `[u8; 40]`, here a [`Vec<String>`].
//!
//! The metadata categories are enumerated by [`DbrCategory`] and represented by
//! [`Dbr`]:
//! - [`Dbr::Basic`] - the plain value.
//! - [`Dbr::Status`] - alarm status and severity in addition to the data.
//! - [`Dbr::Time`] - status plus the server timestamp. Subscriptions that feed
//!   application values always use this category.
//! - [`Dbr::Graphics`] - status plus units, precision and display/alarm/warning limits.
//! - [`Dbr::Control`] - everything in graphics plus the control limits. This is what
//!   the PV layer requests as channel metadata.
//! - [`Dbr::ClassName`] - the EPICS record type for the PV.
//!
//! Encoding these to and from the wire is left to the transport.
//!
//! [DBR]:
//!     https://docs.epics-controls.org/en/latest/internal/ca_protocol.html#payload-data-types

use std::{convert::TryFrom, fmt, str::FromStr, time::SystemTime};

/// Decode bytes up to the first NUL, replacing anything that isn't UTF-8
pub fn nul_terminated_to_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Represent actual data transferred over CA
#[derive(Clone, Debug, PartialEq)]
pub enum DbrValue {
    Enum(Vec<u16>),
    String(Vec<String>),
    Char(Vec<i8>),
    Int(Vec<i16>),
    Long(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl DbrValue {
    pub fn get_count(&self) -> usize {
        match self {
            DbrValue::Enum(val) => val.len(),
            DbrValue::String(val) => val.len(),
            DbrValue::Char(val) => val.len(),
            DbrValue::Int(val) => val.len(),
            DbrValue::Long(val) => val.len(),
            DbrValue::Float(val) => val.len(),
            DbrValue::Double(val) => val.len(),
        }
    }
    pub fn get_type(&self) -> DbrBasicType {
        match self {
            DbrValue::Enum(_) => DbrBasicType::Enum,
            DbrValue::String(_) => DbrBasicType::String,
            DbrValue::Char(_) => DbrBasicType::Char,
            DbrValue::Int(_) => DbrBasicType::Int,
            DbrValue::Long(_) => DbrBasicType::Long,
            DbrValue::Float(_) => DbrBasicType::Float,
            DbrValue::Double(_) => DbrBasicType::Double,
        }
    }
}

/// Implement From<datatype> for a specific dbrvalue kind
macro_rules! impl_dbrvalue_conversions_between {
    ($variant:ident, $typ:ty) => {
        impl From<Vec<$typ>> for DbrValue {
            fn from(value: Vec<$typ>) -> Self {
                DbrValue::$variant(value)
            }
        }
        impl From<$typ> for DbrValue {
            fn from(value: $typ) -> Self {
                DbrValue::$variant(vec![value])
            }
        }
    };
}
impl_dbrvalue_conversions_between!(Char, i8);
impl_dbrvalue_conversions_between!(Int, i16);
impl_dbrvalue_conversions_between!(Long, i32);
impl_dbrvalue_conversions_between!(Float, f32);
impl_dbrvalue_conversions_between!(Double, f64);
impl_dbrvalue_conversions_between!(String, String);

impl From<&str> for DbrValue {
    fn from(value: &str) -> Self {
        DbrValue::String(vec![value.to_string()])
    }
}

/// Display, alarm and warning limits as `(lower, upper)` pairs
#[derive(Clone, Debug, PartialEq)]
pub struct Limits<T> {
    pub display_limits: (T, T),
    pub alarm_limits: (T, T),
    pub warning_limits: (T, T),
}

/// Graphics metadata, shared by the `GR` and `CTRL` categories
#[derive(Clone, Debug, PartialEq)]
pub enum DbrGraphics {
    Enum {
        labels: Vec<String>,
    },
    String,
    Char {
        units: String,
        limits: Limits<i8>,
    },
    Int {
        units: String,
        limits: Limits<i16>,
    },
    Long {
        units: String,
        limits: Limits<i32>,
    },
    Float {
        units: String,
        limits: Limits<f32>,
        precision: i16,
    },
    Double {
        units: String,
        limits: Limits<f64>,
        precision: i16,
    },
}

impl DbrGraphics {
    pub fn basic_type(&self) -> DbrBasicType {
        match self {
            DbrGraphics::Enum { .. } => DbrBasicType::Enum,
            DbrGraphics::String => DbrBasicType::String,
            DbrGraphics::Char { .. } => DbrBasicType::Char,
            DbrGraphics::Int { .. } => DbrBasicType::Int,
            DbrGraphics::Long { .. } => DbrBasicType::Long,
            DbrGraphics::Float { .. } => DbrBasicType::Float,
            DbrGraphics::Double { .. } => DbrBasicType::Double,
        }
    }
    pub fn units(&self) -> Option<&str> {
        match self {
            DbrGraphics::Enum { .. } | DbrGraphics::String => None,
            DbrGraphics::Char { units, .. }
            | DbrGraphics::Int { units, .. }
            | DbrGraphics::Long { units, .. }
            | DbrGraphics::Float { units, .. }
            | DbrGraphics::Double { units, .. } => Some(units),
        }
    }
    /// Display precision; only floating-point types carry one
    pub fn precision(&self) -> Option<i16> {
        match self {
            DbrGraphics::Float { precision, .. } | DbrGraphics::Double { precision, .. } => {
                Some(*precision)
            }
            _ => None,
        }
    }
}

/// Control limits as `(lower, upper)`
#[derive(Clone, Debug, PartialEq)]
pub enum DbrControl {
    Enum,
    String,
    Char(i8, i8),
    Int(i16, i16),
    Long(i32, i32),
    Float(f32, f32),
    Double(f64, f64),
}

/// Basic DBR Data types, independent of category
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DbrBasicType {
    String = 0,
    Int = 1,
    Float = 2,
    Enum = 3,
    Char = 4,
    Long = 5,
    Double = 6,
}
impl TryFrom<u16> for DbrBasicType {
    type Error = ();
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            x if x == Self::String as u16 => Ok(Self::String),
            x if x == Self::Int as u16 => Ok(Self::Int),
            x if x == Self::Float as u16 => Ok(Self::Float),
            x if x == Self::Enum as u16 => Ok(Self::Enum),
            x if x == Self::Char as u16 => Ok(Self::Char),
            x if x == Self::Long as u16 => Ok(Self::Long),
            x if x == Self::Double as u16 => Ok(Self::Double),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DbrBasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DbrBasicType::String => "STRING",
            DbrBasicType::Int => "SHORT",
            DbrBasicType::Float => "FLOAT",
            DbrBasicType::Enum => "ENUM",
            DbrBasicType::Char => "CHAR",
            DbrBasicType::Long => "LONG",
            DbrBasicType::Double => "DOUBLE",
        })
    }
}

/// Mapping of DBR categories
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DbrCategory {
    Basic = 0,
    Status = 1,
    Time = 2,
    Graphics = 3,
    Control = 4,
    /// The special single-valued DBR_CLASS_NAME
    ClassName = 8,
}
impl TryFrom<u16> for DbrCategory {
    type Error = ();
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            x if x == Self::Basic as u16 => Ok(Self::Basic),
            x if x == Self::Status as u16 => Ok(Self::Status),
            x if x == Self::Time as u16 => Ok(Self::Time),
            x if x == Self::Graphics as u16 => Ok(Self::Graphics),
            x if x == Self::Control as u16 => Ok(Self::Control),
            38 => Ok(Self::ClassName),
            _ => Err(()),
        }
    }
}

/// Represent and translate from ID every possible combination of `DBR_*_*`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DbrType {
    pub basic_type: DbrBasicType,
    pub category: DbrCategory,
}

pub const DBR_CLASS_NAME: DbrType = DbrType {
    basic_type: DbrBasicType::String,
    category: DbrCategory::ClassName,
};

impl TryFrom<u16> for DbrType {
    type Error = ();
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            38 => Ok(DBR_CLASS_NAME),
            value if value < 35 => Ok(Self {
                basic_type: (value % 7).try_into()?,
                category: (value / 7).try_into()?,
            }),
            _ => Err(()),
        }
    }
}

impl From<DbrType> for u16 {
    fn from(value: DbrType) -> Self {
        match value {
            DBR_CLASS_NAME => 38,
            value => value.category as u16 * 7 + value.basic_type as u16,
        }
    }
}

impl DbrType {
    pub const fn new(basic_type: DbrBasicType, category: DbrCategory) -> Self {
        Self {
            basic_type,
            category,
        }
    }

    /// The `DBR_TIME_*` variant carrying the same basic type
    ///
    /// Returns `None` for the kinds that only exist for specific requests and
    /// cannot be subscribed to as time-stamped values (e.g. `DBR_CLASS_NAME`).
    pub fn time_type(&self) -> Option<DbrType> {
        match self.category {
            DbrCategory::ClassName => None,
            _ => Some(DbrType::new(self.basic_type, DbrCategory::Time)),
        }
    }

    /// The `DBR_CTRL_*` variant carrying the same basic type
    pub fn controls_type(&self) -> Option<DbrType> {
        match self.category {
            DbrCategory::ClassName => None,
            _ => Some(DbrType::new(self.basic_type, DbrCategory::Control)),
        }
    }

}

impl fmt::Display for DbrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.category {
            DbrCategory::Basic => "DBR_",
            DbrCategory::Status => "DBR_STS_",
            DbrCategory::Time => "DBR_TIME_",
            DbrCategory::Graphics => "DBR_GR_",
            DbrCategory::Control => "DBR_CTRL_",
            DbrCategory::ClassName => return f.write_str("DBR_CLASS_NAME"),
        };
        write!(f, "{prefix}{}", self.basic_type)
    }
}

impl FromStr for DbrType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        let s = upper.strip_prefix("DBR_").unwrap_or(&upper);
        let (category, kind) = match s.split_once('_') {
            Some((cats, rest)) => (
                match cats {
                    "BASIC" => DbrCategory::Basic,
                    "STS" => DbrCategory::Status,
                    "TIME" => DbrCategory::Time,
                    "GR" => DbrCategory::Graphics,
                    "CTRL" => DbrCategory::Control,
                    "CLASS" => DbrCategory::ClassName,
                    _ => return Err(()),
                },
                rest,
            ),
            None => (DbrCategory::Basic, s),
        };
        let kind = match kind {
            "STRING" => DbrBasicType::String,
            "INT" | "SHORT" => DbrBasicType::Int,
            "FLOAT" => DbrBasicType::Float,
            "ENUM" => DbrBasicType::Enum,
            "CHAR" => DbrBasicType::Char,
            "LONG" => DbrBasicType::Long,
            "DOUBLE" => DbrBasicType::Double,
            "NAME" if category == DbrCategory::ClassName => DbrBasicType::String,
            _ => return Err(()),
        };
        if matches!(category, DbrCategory::ClassName) && !matches!(kind, DbrBasicType::String) {
            // Class name is _only_ CLASS_NAME
            return Err(());
        }
        Ok(DbrType::new(kind, category))
    }
}

/// Represent alarm status of the record
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub status: i16,
    pub severity: i16,
}

/// Structured unit of exchange for records in the CA protocol
#[derive(Clone, Debug, PartialEq)]
pub enum Dbr {
    /// Value only, with no metadata
    Basic(DbrValue),
    /// Alarm status metadata alongside the record value
    Status { status: Status, value: DbrValue },
    /// Timestamp, alarm status, and value
    Time {
        status: Status,
        timestamp: SystemTime,
        value: DbrValue,
    },
    Graphics {
        status: Status,
        graphics: DbrGraphics,
        value: DbrValue,
    },
    Control {
        status: Status,
        graphics: DbrGraphics,
        control: DbrControl,
        value: DbrValue,
    },
    ClassName(DbrValue),
}

impl Dbr {
    pub fn take_value(self) -> DbrValue {
        match self {
            Dbr::Basic(value)
            | Dbr::Status { value, .. }
            | Dbr::Time { value, .. }
            | Dbr::Graphics { value, .. }
            | Dbr::Control { value, .. }
            | Dbr::ClassName(value) => value,
        }
    }
    /// Retrieve the [`DbrValue`] contained by this DBR
    pub fn value(&self) -> &DbrValue {
        match self {
            Dbr::Basic(value)
            | Dbr::Status { value, .. }
            | Dbr::Time { value, .. }
            | Dbr::Graphics { value, .. }
            | Dbr::Control { value, .. }
            | Dbr::ClassName(value) => value,
        }
    }
    /// If a DBR type encoding alarm status, fetch that
    pub fn status(&self) -> Option<Status> {
        match self {
            Dbr::Basic(_) | Dbr::ClassName(_) => None,
            Dbr::Status { status, .. }
            | Dbr::Time { status, .. }
            | Dbr::Graphics { status, .. }
            | Dbr::Control { status, .. } => Some(*status),
        }
    }
    pub fn timestamp(&self) -> Option<SystemTime> {
        match self {
            Dbr::Time { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }
    pub fn graphics(&self) -> Option<&DbrGraphics> {
        match self {
            Dbr::Graphics { graphics, .. } | Dbr::Control { graphics, .. } => Some(graphics),
            _ => None,
        }
    }
    pub fn control(&self) -> Option<&DbrControl> {
        match self {
            Dbr::Control { control, .. } => Some(control),
            _ => None,
        }
    }
    pub fn data_type(&self) -> DbrType {
        let category = match self {
            Dbr::Basic(_) => DbrCategory::Basic,
            Dbr::Status { .. } => DbrCategory::Status,
            Dbr::Time { .. } => DbrCategory::Time,
            Dbr::Graphics { .. } => DbrCategory::Graphics,
            Dbr::Control { .. } => DbrCategory::Control,
            Dbr::ClassName(_) => return DBR_CLASS_NAME,
        };
        DbrType::new(self.value().get_type(), category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_follow_category() {
        let dbr = Dbr::Control {
            status: Status {
                status: 3,
                severity: 2,
            },
            graphics: DbrGraphics::Char {
                units: "V".to_string(),
                limits: Limits {
                    display_limits: (0, 10),
                    alarm_limits: (1, 9),
                    warning_limits: (2, 8),
                },
            },
            control: DbrControl::Char(0, 5),
            value: 42i8.into(),
        };
        assert_eq!(dbr.data_type().to_string(), "DBR_CTRL_CHAR");
        assert_eq!(dbr.value(), &DbrValue::Char(vec![42]));
        assert_eq!(dbr.status().map(|s| s.severity), Some(2));
        assert_eq!(dbr.graphics().and_then(|g| g.units()), Some("V"));
        assert_eq!(dbr.control(), Some(&DbrControl::Char(0, 5)));
        assert_eq!(dbr.timestamp(), None);

        let plain = Dbr::Basic("ai".into());
        assert_eq!(plain.data_type().to_string(), "DBR_STRING");
        assert_eq!(plain.status(), None);
        assert_eq!(plain.graphics(), None);
        assert_eq!(plain.take_value(), DbrValue::String(vec!["ai".to_string()]));
    }

    #[test]
    fn type_mappings() {
        let native: DbrType = "DOUBLE".parse().unwrap();
        assert_eq!(native.time_type(), Some("DBR_TIME_DOUBLE".parse().unwrap()));
        assert_eq!(native.controls_type(), Some("DBR_CTRL_DOUBLE".parse().unwrap()));
        assert_eq!(DBR_CLASS_NAME.time_type(), None);
        assert_eq!(DBR_CLASS_NAME.controls_type(), None);
        assert_eq!(u16::from(native.time_type().unwrap()), 20);
        assert_eq!(DbrType::try_from(34u16).unwrap().to_string(), "DBR_CTRL_DOUBLE");
        assert_eq!(DbrType::try_from(38u16), Ok(DBR_CLASS_NAME));
        assert!(DbrType::try_from(35u16).is_err());
    }

    #[test]
    fn test_dbr_string_conversions() {
        assert_eq!(
            DbrType::new(DbrBasicType::Int, DbrCategory::Status),
            "DBR_STS_INT".parse().unwrap()
        );
        assert_eq!(
            DbrType::new(DbrBasicType::Int, DbrCategory::Basic),
            "SHORT".parse().unwrap()
        );
        assert_eq!(
            DbrType::new(DbrBasicType::String, DbrCategory::Graphics),
            "GR_STRING".parse().unwrap()
        );
        assert_eq!(DBR_CLASS_NAME, "DBR_CLASS_NAME".parse().unwrap());
        assert!("DBR_CLASS_INT".parse::<DbrType>().is_err());
        assert!("DBR_WHAT_INT".parse::<DbrType>().is_err());
    }
}
