//! Application-facing values.
//!
//! A [`PvValue`] is what listeners and readers see: a [`Payload`] together with the
//! alarm state, the server timestamp and, for numeric channels with metadata, a
//! [`Display`] describing limits, units and formatting.

use std::time::SystemTime;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlarmSeverity {
    None,
    Minor,
    Major,
    Invalid,
    Undefined,
}

impl From<i16> for AlarmSeverity {
    fn from(value: i16) -> Self {
        match value {
            0 => AlarmSeverity::None,
            1 => AlarmSeverity::Minor,
            2 => AlarmSeverity::Major,
            3 => AlarmSeverity::Invalid,
            _ => AlarmSeverity::Undefined,
        }
    }
}

const ALARM_STATUS_NAMES: [&str; 22] = [
    "NO_ALARM",
    "READ",
    "WRITE",
    "HIHI",
    "HIGH",
    "LOLO",
    "LOW",
    "STATE",
    "COS",
    "COMM",
    "TIMEOUT",
    "HWLIMIT",
    "CALC",
    "SCAN",
    "LINK",
    "SOFT",
    "BAD_SUB",
    "UDF",
    "DISABLE",
    "SIMM",
    "READ_ACCESS",
    "WRITE_ACCESS",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub severity: AlarmSeverity,
    /// Name of the CA alarm condition, e.g. `HIHI`
    pub status: String,
}

impl Alarm {
    pub fn none() -> Alarm {
        Alarm {
            severity: AlarmSeverity::None,
            status: ALARM_STATUS_NAMES[0].to_string(),
        }
    }

    /// Build from the raw `status`/`severity` pair of a DBR
    pub fn from_codes(status: i16, severity: i16) -> Alarm {
        let status = usize::try_from(status)
            .ok()
            .and_then(|i| ALARM_STATUS_NAMES.get(i))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("UNKNOWN({status})"));
        Alarm {
            severity: severity.into(),
            status,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub fn new(low: f64, high: f64) -> Range {
        Range { low, high }
    }
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NumberFormat {
    /// Render with a fixed number of fractional digits
    Precision(u16),
    /// Render however the value's type renders by default
    Default,
}

/// Presentation metadata for numeric values
#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    pub display: Range,
    pub alarm: Range,
    pub warning: Range,
    pub control: Range,
    pub units: String,
    pub format: NumberFormat,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Scalar {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    Double(f64),
}

impl Scalar {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Byte(v) => v.into(),
            Scalar::Short(v) => v.into(),
            Scalar::Int(v) => v.into(),
            Scalar::Float(v) => v.into(),
            Scalar::Double(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl NumericArray {
    pub fn len(&self) -> usize {
        match self {
            NumericArray::Byte(v) => v.len(),
            NumericArray::Short(v) => v.len(),
            NumericArray::Int(v) => v.len(),
            NumericArray::Float(v) => v.len(),
            NumericArray::Double(v) => v.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(Scalar),
    Array(NumericArray),
    String(String),
    StringArray(Vec<String>),
    Enum { index: u16, choices: Vec<String> },
    EnumArray { indices: Vec<u16>, choices: Vec<String> },
}

impl Payload {
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Payload::Array(_) | Payload::StringArray(_) | Payload::EnumArray { .. }
        )
    }
}

/// A merged, immutable value of a process variable
#[derive(Debug, Clone, PartialEq)]
pub struct PvValue {
    pub payload: Payload,
    pub alarm: Alarm,
    pub timestamp: SystemTime,
    pub display: Option<Display>,
}

impl PvValue {
    /// The numeric value of a scalar payload, if there is one
    pub fn as_f64(&self) -> Option<f64> {
        match &self.payload {
            Payload::Scalar(s) => Some(s.as_f64()),
            Payload::Enum { index, .. } => Some((*index).into()),
            _ => None,
        }
    }
    /// The label of an enum value, or the text of a string value
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            Payload::Enum { index, choices } => choices.get(*index as usize).map(String::as_str),
            _ => None,
        }
    }
}

/// A value that the application asks to write to a channel
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Enum(u16),
    String(String),
    ByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    EnumArray(Vec<u16>),
    StringArray(Vec<String>),
}

macro_rules! impl_write_value_from {
    ($scalar:ident, $array:ident, $typ:ty) => {
        impl From<$typ> for WriteValue {
            fn from(value: $typ) -> Self {
                WriteValue::$scalar(value)
            }
        }
        impl From<Vec<$typ>> for WriteValue {
            fn from(value: Vec<$typ>) -> Self {
                WriteValue::$array(value)
            }
        }
    };
}
impl_write_value_from!(Byte, ByteArray, i8);
impl_write_value_from!(Short, ShortArray, i16);
impl_write_value_from!(Int, IntArray, i32);
impl_write_value_from!(Long, LongArray, i64);
impl_write_value_from!(Float, FloatArray, f32);
impl_write_value_from!(Double, DoubleArray, f64);
impl_write_value_from!(String, StringArray, String);

impl From<&str> for WriteValue {
    fn from(value: &str) -> Self {
        WriteValue::String(value.to_string())
    }
}

impl From<Payload> for WriteValue {
    fn from(value: Payload) -> Self {
        match value {
            Payload::Scalar(Scalar::Byte(v)) => WriteValue::Byte(v),
            Payload::Scalar(Scalar::Short(v)) => WriteValue::Short(v),
            Payload::Scalar(Scalar::Int(v)) => WriteValue::Int(v),
            Payload::Scalar(Scalar::Float(v)) => WriteValue::Float(v),
            Payload::Scalar(Scalar::Double(v)) => WriteValue::Double(v),
            Payload::Array(NumericArray::Byte(v)) => WriteValue::ByteArray(v),
            Payload::Array(NumericArray::Short(v)) => WriteValue::ShortArray(v),
            Payload::Array(NumericArray::Int(v)) => WriteValue::IntArray(v),
            Payload::Array(NumericArray::Float(v)) => WriteValue::FloatArray(v),
            Payload::Array(NumericArray::Double(v)) => WriteValue::DoubleArray(v),
            Payload::String(v) => WriteValue::String(v),
            Payload::StringArray(v) => WriteValue::StringArray(v),
            Payload::Enum { index, .. } => WriteValue::Enum(index),
            Payload::EnumArray { indices, .. } => WriteValue::EnumArray(indices),
        }
    }
}

impl From<PvValue> for WriteValue {
    fn from(value: PvValue) -> Self {
        value.payload.into()
    }
}
