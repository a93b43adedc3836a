//! Conversion between channel payloads and application values.
//!
//! Reading goes from a pair of (optional controls [`Dbr`], time [`Dbr`]) to a
//! [`PvValue`]. Writing goes from a [`WriteValue`] to the plain [`DbrValue`] that
//! a channel put accepts.

use std::time::SystemTime;

use num::ToPrimitive;
use tracing::warn;

use crate::{
    config::LongConversionMode,
    dbr::{
        Dbr, DbrBasicType, DbrControl, DbrGraphics, DbrValue, Limits, nul_terminated_to_string,
    },
    error::ConvertError,
    value::{
        Alarm, Display, NumberFormat, NumericArray, Payload, PvValue, Range, Scalar, WriteValue,
    },
};

/// Enum indices beyond this have no label slot in CA
const MAX_ENUM_INDEX: u16 = 15;

/// Per-channel switches for [`to_pv_value`]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Present single elements as arrays. Set when the channel declares a count other than 1.
    pub force_array: bool,
    /// A precision of zero means "no fractional digits" rather than "default format"
    pub honor_zero_precision: bool,
    /// Decode char arrays as NUL-terminated text
    pub long_string: bool,
}

/// Merge a value with its (optional) metadata into an application value
///
/// Metadata of a different basic type than the value is ignored. Values without a
/// timestamp get the current time; values without status get no alarm.
pub fn to_pv_value(metadata: Option<&Dbr>, value: &Dbr, options: ConvertOptions) -> PvValue {
    let value_type = value.value().get_type();
    let metadata = metadata.filter(|m| m.value().get_type() == value_type);
    let graphics = metadata.and_then(Dbr::graphics);

    let alarm = value
        .status()
        .map(|s| Alarm::from_codes(s.status, s.severity))
        .unwrap_or_else(Alarm::none);
    let timestamp = value.timestamp().unwrap_or_else(SystemTime::now);

    let single = value.value().get_count() == 1 && !options.force_array;
    let payload = match value.value() {
        DbrValue::Char(v) if options.long_string => Payload::String(char_array_to_string(v)),
        DbrValue::String(v) => match v.as_slice() {
            [s] if single => Payload::String(s.clone()),
            _ => Payload::StringArray(v.clone()),
        },
        DbrValue::Enum(indices) => {
            let labels = match graphics {
                Some(DbrGraphics::Enum { labels }) => Some(labels),
                _ => None,
            };
            enum_payload(indices, labels, single)
        }
        DbrValue::Char(v) => numeric(v, single, Scalar::Byte, NumericArray::Byte),
        DbrValue::Int(v) => numeric(v, single, Scalar::Short, NumericArray::Short),
        DbrValue::Long(v) => numeric(v, single, Scalar::Int, NumericArray::Int),
        DbrValue::Float(v) => numeric(v, single, Scalar::Float, NumericArray::Float),
        DbrValue::Double(v) => numeric(v, single, Scalar::Double, NumericArray::Double),
    };

    let display = match payload {
        Payload::Scalar(_) | Payload::Array(_) if value_type != DbrBasicType::Enum => {
            graphics.and_then(|g| {
                convert_display(
                    g,
                    metadata.and_then(Dbr::control),
                    options.honor_zero_precision,
                )
            })
        }
        _ => None,
    };

    PvValue {
        payload,
        alarm,
        timestamp,
        display,
    }
}

fn char_array_to_string(value: &[i8]) -> String {
    let bytes: Vec<u8> = value.iter().map(|&c| c as u8).collect();
    nul_terminated_to_string(&bytes)
}

fn numeric<T: Copy>(
    values: &[T],
    single: bool,
    scalar: impl Fn(T) -> Scalar,
    array: impl Fn(Vec<T>) -> NumericArray,
) -> Payload {
    match values {
        [v] if single => Payload::Scalar(scalar(*v)),
        _ => Payload::Array(array(values.to_vec())),
    }
}

/// Enum values become enums only with labels to go with them and indices that
/// can have a label; anything else is presented as plain integers.
fn enum_payload(indices: &[u16], labels: Option<&Vec<String>>, single: bool) -> Payload {
    if let [index] = indices
        && single
    {
        return match labels {
            Some(labels) if *index <= MAX_ENUM_INDEX => Payload::Enum {
                index: *index,
                choices: enum_choices(labels, *index as usize + 1),
            },
            _ => Payload::Scalar(match i16::try_from(*index) {
                Ok(short) => Scalar::Short(short),
                Err(_) => Scalar::Int((*index).into()),
            }),
        };
    }
    let max = indices.iter().copied().max();
    match labels {
        Some(labels) if max.is_none_or(|m| m <= MAX_ENUM_INDEX) => Payload::EnumArray {
            indices: indices.to_vec(),
            choices: enum_choices(labels, max.map_or(0, |m| m as usize + 1)),
        },
        _ => match indices.iter().map(|&i| i16::try_from(i)).collect() {
            Ok(shorts) => Payload::Array(NumericArray::Short(shorts)),
            Err(_) => Payload::Array(NumericArray::Int(
                indices.iter().map(|&i| i.into()).collect(),
            )),
        },
    }
}

/// Pad the labels so that every index below `min_count` has one
fn enum_choices(labels: &[String], min_count: usize) -> Vec<String> {
    let mut choices = labels.to_vec();
    for index in choices.len()..min_count {
        choices.push(format!("Index {index}"));
    }
    choices
}

fn range<T: ToPrimitive>((low, high): &(T, T)) -> Range {
    Range::new(
        low.to_f64().unwrap_or(f64::NAN),
        high.to_f64().unwrap_or(f64::NAN),
    )
}

fn limit_ranges<T: ToPrimitive>(limits: &Limits<T>) -> (Range, Range, Range) {
    (
        range(&limits.display_limits),
        range(&limits.alarm_limits),
        range(&limits.warning_limits),
    )
}

fn convert_display(
    graphics: &DbrGraphics,
    control: Option<&DbrControl>,
    honor_zero_precision: bool,
) -> Option<Display> {
    let (units, (display, alarm, warning)) = match graphics {
        DbrGraphics::Enum { .. } | DbrGraphics::String => return None,
        DbrGraphics::Char { units, limits } => (units, limit_ranges(limits)),
        DbrGraphics::Int { units, limits } => (units, limit_ranges(limits)),
        DbrGraphics::Long { units, limits } => (units, limit_ranges(limits)),
        DbrGraphics::Float { units, limits, .. } => (units, limit_ranges(limits)),
        DbrGraphics::Double { units, limits, .. } => (units, limit_ranges(limits)),
    };
    let control = match control {
        Some(DbrControl::Char(low, high)) => range(&(*low, *high)),
        Some(DbrControl::Int(low, high)) => range(&(*low, *high)),
        Some(DbrControl::Long(low, high)) => range(&(*low, *high)),
        Some(DbrControl::Float(low, high)) => range(&(*low, *high)),
        Some(DbrControl::Double(low, high)) => range(&(*low, *high)),
        _ => display,
    };
    let precision = graphics.precision().unwrap_or(0);
    let format = if precision > 0 || (honor_zero_precision && precision == 0) {
        NumberFormat::Precision(precision as u16)
    } else {
        NumberFormat::Default
    };
    Some(Display {
        display,
        alarm,
        warning,
        control,
        units: units.clone(),
        format,
    })
}

/// Convert an application value into something a channel put accepts
///
/// In long-string mode text is sent as a char array. 64-bit integers outside the
/// range of a CA `LONG` are handled according to `long_conversion_mode`.
pub fn to_dbr_value(
    pv_name: &str,
    value: WriteValue,
    long_string: bool,
    long_conversion_mode: LongConversionMode,
) -> Result<DbrValue, ConvertError> {
    Ok(match value {
        WriteValue::Byte(v) => v.into(),
        WriteValue::Short(v) => DbrValue::Int(vec![v]),
        WriteValue::Int(v) => v.into(),
        WriteValue::Float(v) => v.into(),
        WriteValue::Double(v) => v.into(),
        WriteValue::Enum(v) => DbrValue::Enum(vec![v]),
        WriteValue::ByteArray(v) => v.into(),
        WriteValue::ShortArray(v) => DbrValue::Int(v),
        WriteValue::IntArray(v) => v.into(),
        WriteValue::FloatArray(v) => v.into(),
        WriteValue::DoubleArray(v) => v.into(),
        WriteValue::EnumArray(v) => DbrValue::Enum(v),
        WriteValue::Long(v) => convert_longs(pv_name, vec![v], long_conversion_mode)?,
        WriteValue::LongArray(v) => convert_longs(pv_name, v, long_conversion_mode)?,
        WriteValue::String(s) if long_string => string_to_char_array(&s),
        WriteValue::String(s) => s.into(),
        WriteValue::StringArray(mut v) if long_string && v.len() == 1 => {
            string_to_char_array(&v.remove(0))
        }
        WriteValue::StringArray(v) => v.into(),
    })
}

fn string_to_char_array(value: &str) -> DbrValue {
    DbrValue::Char(value.bytes().map(|b| b as i8).collect())
}

fn convert_longs(
    pv_name: &str,
    values: Vec<i64>,
    mode: LongConversionMode,
) -> Result<DbrValue, ConvertError> {
    if values.iter().all(|&v| i32::try_from(v).is_ok()) {
        return Ok(DbrValue::Long(values.iter().map(|&v| v as i32).collect()));
    }
    let converted = match mode {
        LongConversionMode::Coerce | LongConversionMode::CoerceAndWarn => DbrValue::Long(
            values
                .iter()
                .map(|&v| v.clamp(i32::MIN.into(), i32::MAX.into()) as i32)
                .collect(),
        ),
        LongConversionMode::Convert | LongConversionMode::ConvertAndWarn => {
            DbrValue::Double(values.iter().map(|&v| v as f64).collect())
        }
        LongConversionMode::Truncate | LongConversionMode::TruncateAndWarn => {
            DbrValue::Long(values.iter().map(|&v| v as i32).collect())
        }
        LongConversionMode::Fail => {
            return Err(ConvertError::LongOutOfRange(describe(&values)));
        }
    };
    if mode.warns() {
        warn!(
            "Writing long {} as {:?} for PV {pv_name}",
            describe(&values),
            converted
        );
    }
    Ok(converted)
}

fn describe(values: &[i64]) -> String {
    match values {
        [v] => v.to_string(),
        _ => format!("{values:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::{dbr::Status, value::AlarmSeverity};

    fn time_value(value: impl Into<DbrValue>) -> Dbr {
        Dbr::Time {
            status: Status {
                status: 3,
                severity: 2,
            },
            timestamp: UNIX_EPOCH + Duration::from_secs(1_000_000_000),
            value: value.into(),
        }
    }

    fn double_controls(precision: i16) -> Dbr {
        Dbr::Control {
            status: Status::default(),
            graphics: DbrGraphics::Double {
                units: "mm".to_string(),
                limits: Limits {
                    display_limits: (-10.0, 10.0),
                    alarm_limits: (-9.0, 9.0),
                    warning_limits: (-8.0, 8.0),
                },
                precision,
            },
            control: DbrControl::Double(-5.0, 5.0),
            value: 0.0f64.into(),
        }
    }

    fn enum_controls(labels: &[&str]) -> Dbr {
        Dbr::Control {
            status: Status::default(),
            graphics: DbrGraphics::Enum {
                labels: labels.iter().map(|s| s.to_string()).collect(),
            },
            control: DbrControl::Enum,
            value: DbrValue::Enum(vec![0]),
        }
    }

    fn options() -> ConvertOptions {
        ConvertOptions {
            honor_zero_precision: true,
            ..Default::default()
        }
    }

    #[test]
    fn double_with_controls() {
        let controls = double_controls(3);
        let v = to_pv_value(Some(&controls), &time_value(1.5f64), options());
        assert_eq!(v.payload, Payload::Scalar(Scalar::Double(1.5)));
        assert_eq!(v.alarm.severity, AlarmSeverity::Major);
        assert_eq!(v.alarm.status, "HIHI");
        assert_eq!(v.timestamp, UNIX_EPOCH + Duration::from_secs(1_000_000_000));
        let display = v.display.unwrap();
        assert_eq!(display.units, "mm");
        assert_eq!(display.display, Range::new(-10.0, 10.0));
        assert_eq!(display.warning, Range::new(-8.0, 8.0));
        assert_eq!(display.control, Range::new(-5.0, 5.0));
        assert_eq!(display.format, NumberFormat::Precision(3));
    }

    #[test]
    fn zero_precision() {
        let controls = double_controls(0);
        let honoured = to_pv_value(Some(&controls), &time_value(1.5f64), options());
        assert_eq!(honoured.display.unwrap().format, NumberFormat::Precision(0));
        let ignored = to_pv_value(
            Some(&controls),
            &time_value(1.5f64),
            ConvertOptions::default(),
        );
        assert_eq!(ignored.display.unwrap().format, NumberFormat::Default);
        let negative = to_pv_value(Some(&double_controls(-1)), &time_value(1.5f64), options());
        assert_eq!(negative.display.unwrap().format, NumberFormat::Default);
    }

    #[test]
    fn force_array_uses_declared_count() {
        let forced = ConvertOptions {
            force_array: true,
            ..options()
        };
        let v = to_pv_value(None, &time_value(vec![7i32]), forced);
        assert_eq!(v.payload, Payload::Array(NumericArray::Int(vec![7])));
        let v = to_pv_value(None, &time_value(vec![7i32, 8]), options());
        assert!(v.payload.is_array());
        let v = to_pv_value(None, &time_value("text"), forced);
        assert_eq!(v.payload, Payload::StringArray(vec!["text".to_string()]));
    }

    #[test]
    fn mismatched_metadata_is_ignored() {
        let controls = double_controls(3);
        let v = to_pv_value(Some(&controls), &time_value(4i16), options());
        assert_eq!(v.payload, Payload::Scalar(Scalar::Short(4)));
        assert_eq!(v.display, None);
    }

    #[test]
    fn long_string_char_array() {
        let long = ConvertOptions {
            long_string: true,
            force_array: true,
            ..options()
        };
        let chars: Vec<i8> = b"hello\0junk".iter().map(|&c| c as i8).collect();
        let v = to_pv_value(None, &time_value(chars.clone()), long);
        assert_eq!(v.payload, Payload::String("hello".to_string()));
        assert_eq!(v.display, None);
        let v = to_pv_value(None, &time_value(chars), options());
        assert!(matches!(v.payload, Payload::Array(NumericArray::Byte(_))));
    }

    #[test]
    fn enum_labels() {
        let controls = enum_controls(&["Off", "On"]);
        let v = to_pv_value(Some(&controls), &time_value(DbrValue::Enum(vec![1])), options());
        assert_eq!(v.as_str(), Some("On"));

        // Labels are padded for indices the server gave no label
        let v = to_pv_value(Some(&controls), &time_value(DbrValue::Enum(vec![3])), options());
        assert_eq!(
            v.payload,
            Payload::Enum {
                index: 3,
                choices: vec!["Off", "On", "Index 2", "Index 3"]
                    .into_iter()
                    .map(String::from)
                    .collect()
            }
        );

        // Out of range or without labels, it's just a number
        let v = to_pv_value(Some(&controls), &time_value(DbrValue::Enum(vec![16])), options());
        assert_eq!(v.payload, Payload::Scalar(Scalar::Short(16)));
        let v = to_pv_value(None, &time_value(DbrValue::Enum(vec![1])), options());
        assert_eq!(v.payload, Payload::Scalar(Scalar::Short(1)));
        assert_eq!(v.display, None);
    }

    #[test]
    fn large_enum_indices_do_not_wrap() {
        let v = to_pv_value(None, &time_value(DbrValue::Enum(vec![40000])), options());
        assert_eq!(v.payload, Payload::Scalar(Scalar::Int(40000)));
        let v = to_pv_value(None, &time_value(DbrValue::Enum(vec![1, 40000])), options());
        assert_eq!(v.payload, Payload::Array(NumericArray::Int(vec![1, 40000])));
        let v = to_pv_value(None, &time_value(DbrValue::Enum(vec![1, 2])), options());
        assert_eq!(v.payload, Payload::Array(NumericArray::Short(vec![1, 2])));
    }

    #[test]
    fn enum_arrays() {
        let controls = enum_controls(&["A", "B", "C"]);
        let v = to_pv_value(
            Some(&controls),
            &time_value(DbrValue::Enum(vec![0, 2])),
            options(),
        );
        assert!(matches!(v.payload, Payload::EnumArray { ref choices, .. } if choices.len() == 3));
        let v = to_pv_value(
            Some(&controls),
            &time_value(DbrValue::Enum(vec![0, 20])),
            options(),
        );
        assert_eq!(v.payload, Payload::Array(NumericArray::Short(vec![0, 20])));
    }

    #[test]
    fn plain_values_have_no_alarm() {
        let before = SystemTime::now();
        let v = to_pv_value(None, &Dbr::Basic("ai".into()), options());
        assert_eq!(v.alarm, Alarm::none());
        assert!(v.timestamp >= before);
        assert_eq!(v.payload, Payload::String("ai".to_string()));
    }

    #[test]
    fn write_values() {
        let mode = LongConversionMode::Fail;
        assert_eq!(
            to_dbr_value("PV", 3i16.into(), false, mode),
            Ok(DbrValue::Int(vec![3]))
        );
        assert_eq!(
            to_dbr_value("PV", "abc".into(), true, mode),
            Ok(DbrValue::Char(vec![97, 98, 99]))
        );
        assert_eq!(
            to_dbr_value("PV", "abc".into(), false, mode),
            Ok(DbrValue::String(vec!["abc".to_string()]))
        );
        assert_eq!(
            to_dbr_value("PV", vec!["a".to_string(), "b".to_string()].into(), true, mode),
            Ok(DbrValue::String(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(
            to_dbr_value("PV", 12i64.into(), false, mode),
            Ok(DbrValue::Long(vec![12]))
        );
    }

    #[test]
    fn long_conversion_modes() {
        let big = (i32::MAX as i64) + 10;
        let convert = |mode| to_dbr_value("PV", WriteValue::LongArray(vec![1, big]), false, mode);
        assert_eq!(
            convert(LongConversionMode::Coerce),
            Ok(DbrValue::Long(vec![1, i32::MAX]))
        );
        assert_eq!(
            convert(LongConversionMode::CoerceAndWarn),
            Ok(DbrValue::Long(vec![1, i32::MAX]))
        );
        assert_eq!(
            convert(LongConversionMode::ConvertAndWarn),
            Ok(DbrValue::Double(vec![1.0, big as f64]))
        );
        assert_eq!(
            convert(LongConversionMode::Truncate),
            Ok(DbrValue::Long(vec![1, big as i32]))
        );
        assert!(matches!(
            convert(LongConversionMode::Fail),
            Err(ConvertError::LongOutOfRange(_))
        ));
    }
}
