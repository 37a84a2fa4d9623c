use crate::value::Value;
use serde_derive::Serialize;

/// A single typed value read from (or about to be written to) a
/// device resource, already in its wire-ready, stringified form.
#[derive(Clone, Debug, Serialize)]
pub struct Reading {
    pub name: String,
    pub value: String,
    pub origin_ms: i64,
    pub value_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Reading {
    /// Builds a `Reading` from a device resource's name, a transformed
    /// `Value`, an origin timestamp, and the resource's declared
    /// `mediaType` (only meaningful for `Binary`). Binary payloads are
    /// base64-encoded so the reading is safe to serialize as JSON text.
    pub fn new(name: impl Into<String>, value: &Value, origin_ms: i64, media_type: Option<String>) -> Self {
        let value_type = value.type_name().to_owned();
        let rendered = match value {
            Value::Binary(bytes) => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
            other => other.to_string(),
        };

        Reading {
            name: name.into(),
            value: rendered,
            origin_ms,
            value_type,
            media_type: if matches!(value, Value::Binary(_)) {
                media_type
            } else {
                None
            },
        }
    }
}

/// The payload handed to the platform data service: one device's
/// readings, produced by a single command invocation.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub device: String,
    pub origin_ms: i64,
    pub readings: Vec<Reading>,
}

impl Event {
    pub fn new(device: impl Into<String>, origin_ms: i64, readings: Vec<Reading>) -> Self {
        Event {
            device: device.into(),
            origin_ms,
            readings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_reading_is_base64_encoded() {
        let r = Reading::new(
            "snapshot",
            &Value::Binary(vec![0xff, 0x00, 0x10]),
            1000,
            Some("image/png".into()),
        );

        assert_eq!(r.value, "/wAQ");
        assert_eq!(r.media_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn scalar_reading_has_no_media_type() {
        let r = Reading::new("temperature", &Value::Int16(500), 1000, None);

        assert_eq!(r.value, "500");
        assert!(r.media_type.is_none());
    }

    #[test]
    fn event_serializes_readings_in_order() {
        let ev = Event::new(
            "therm1",
            1000,
            vec![
                Reading::new("a", &Value::Int16(1), 1000, None),
                Reading::new("b", &Value::Int16(2), 1000, None),
            ],
        );

        let json = serde_json::to_string(&ev).unwrap();
        let a_pos = json.find("\"a\"").unwrap();
        let b_pos = json.find("\"b\"").unwrap();
        assert!(a_pos < b_pos);
    }
}
