//! PV names with embedded options.
//!
//! A PV name is a CA channel name, optionally followed by a space and a JSON
//! object with options for this PV:
//!
//! ```text
//! SR:CURRENT {"putCallback": true}
//! IOC:RECORD.DESC$ {"longString": false}
//! ```
//!
//! Channel names may themselves contain spaces and braces, so the options are
//! split off at the leftmost `" {"` after which the rest of the name parses as a
//! JSON object.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Field names ending in `$` ask the IOC for the field as a char array
static LONG_STRING_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+\.[A-Z][A-Z0-9]*\$$").expect("long string field pattern is valid")
});

/// Which kind of put a PV uses for writes
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PutCallback {
    /// Never ask the server to confirm
    No,
    /// Always ask the server to confirm
    Yes,
    /// Unconfirmed for blocking writes, confirmed for asynchronous writes
    #[default]
    Auto,
}

impl From<Option<bool>> for PutCallback {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => PutCallback::Yes,
            Some(false) => PutCallback::No,
            None => PutCallback::Auto,
        }
    }
}

/// The options that can follow a channel name; absent means "decide automatically"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PvNameOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_string: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_callback: Option<bool>,
}

impl PvNameOptions {
    /// Render as the `" {...}"` suffix to append to a channel name
    ///
    /// Returns an empty string when no option is set.
    pub fn to_name_suffix(&self) -> String {
        if *self == PvNameOptions::default() {
            return String::new();
        }
        serde_json::to_string(self)
            .map(|json| format!(" {json}"))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// The name to ask the transport for
    pub channel_name: String,
    pub long_string: bool,
    pub put_callback: PutCallback,
}

/// Split a PV name into the channel name and its options
///
/// Options that cannot be understood are warned about and ignored.
pub fn parse_name(name: &str) -> ParsedName {
    let name = name.trim();
    let (channel_name, options) = split_options(name).unwrap_or((name, Map::new()));

    let long_string = bool_option(name, &options, "longString");
    let put_callback = bool_option(name, &options, "putCallback");

    let long_string =
        long_string.unwrap_or_else(|| LONG_STRING_FIELD.is_match(channel_name));

    ParsedName {
        channel_name: channel_name.to_string(),
        long_string,
        put_callback: put_callback.into(),
    }
}

fn split_options(name: &str) -> Option<(&str, Map<String, Value>)> {
    if !name.ends_with('}') {
        return None;
    }
    let mut first_error = None;
    for (index, _) in name.match_indices(" {") {
        match serde_json::from_str::<Value>(&name[index + 1..]) {
            Ok(Value::Object(options)) => return Some((&name[..index], options)),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        warn!("{name}: Ignoring JSON options in PV name because they cannot be parsed: {e}");
    }
    None
}

fn bool_option(name: &str, options: &Map<String, Value>, key: &str) -> Option<bool> {
    match options.get(key)? {
        Value::Bool(value) => Some(*value),
        other => {
            warn!(
                "{name}: Illegal value {other} for \"{key}\" option (true or false was \
                 expected). Option is going to be ignored."
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names() {
        for name in ["SIMPLE", "  padded:name  ", "with space", "ends.VAL}", "a{b}"] {
            let parsed = parse_name(name);
            assert_eq!(parsed.channel_name, name.trim());
            assert!(!parsed.long_string);
            assert_eq!(parsed.put_callback, PutCallback::Auto);
        }
    }

    #[test]
    fn long_string_detection() {
        assert!(parse_name("IOC:rec.DESC$").long_string);
        assert!(parse_name("IOC:rec.INP1$").long_string);
        assert!(!parse_name("IOC:rec.desc$").long_string);
        assert!(!parse_name("IOC:rec$").long_string);
        assert!(!parse_name(".DESC$").long_string);
        // An explicit false suppresses the detection
        let parsed = parse_name(r#"IOC:rec.DESC$ {"longString": false}"#);
        assert_eq!(parsed.channel_name, "IOC:rec.DESC$");
        assert!(!parsed.long_string);
    }

    #[test]
    fn options() {
        let parsed = parse_name(r#"PV:NAME {"longString":true, "putCallback": false}"#);
        assert_eq!(
            parsed,
            ParsedName {
                channel_name: "PV:NAME".to_string(),
                long_string: true,
                put_callback: PutCallback::No,
            }
        );
        let parsed = parse_name(r#"PV:NAME {"putCallback": true, "other": [1, 2]}"#);
        assert_eq!(parsed.put_callback, PutCallback::Yes);
        assert!(!parsed.long_string);
    }

    #[test]
    fn wrong_typed_options_are_ignored() {
        let parsed = parse_name(r#"PV:NAME {"longString": "yes", "putCallback": 1}"#);
        assert_eq!(parsed.channel_name, "PV:NAME");
        assert!(!parsed.long_string);
        assert_eq!(parsed.put_callback, PutCallback::Auto);
    }

    #[test]
    fn leftmost_parseable_split_wins() {
        // The first " {" does not start valid JSON, the second does
        let parsed = parse_name(r#"odd {name} {"putCallback": true}"#);
        assert_eq!(parsed.channel_name, "odd {name}");
        assert_eq!(parsed.put_callback, PutCallback::Yes);
    }

    #[test]
    fn malformed_options_fall_back_to_whole_name() {
        let raw = r#"PV:NAME {"putCallback": tru}"#;
        let parsed = parse_name(raw);
        assert_eq!(parsed.channel_name, raw);
        assert_eq!(parsed.put_callback, PutCallback::Auto);
        // Idempotent
        assert_eq!(parse_name(&parsed.channel_name), parsed);
    }

    #[test]
    fn options_round_trip() {
        let options = PvNameOptions {
            long_string: Some(true),
            put_callback: Some(false),
        };
        let parsed = parse_name(&format!("IOC:x{}", options.to_name_suffix()));
        assert_eq!(parsed.channel_name, "IOC:x");
        assert!(parsed.long_string);
        assert_eq!(parsed.put_callback, PutCallback::No);

        let only_put = PvNameOptions {
            put_callback: Some(true),
            ..Default::default()
        };
        assert_eq!(only_put.to_name_suffix(), r#" {"putCallback":true}"#);
        assert_eq!(PvNameOptions::default().to_name_suffix(), "");
    }
}
