//! Telemetry body construction
//!
//! Pure formatting: each builder substitutes its fields into the fixed
//! template for the corresponding platform resource and returns the
//! finished string. The dispatcher uses the string's exact byte length
//! as `Content-Length`, so nothing here may append or pad.
//!
//! Templates (see https://cumulocity.com/api/core/ for the resource
//! shapes):
//!   measurement: {"type":T,FRAGMENT:{SERIES:{"value":V[,"unit":U]}},"source":{"id":D},"time":TS}
//!   alarm:       {"severity":S,"source":{"id":D},"text":X,"time":TS,"type":T}
//!   event:       {"source":{"id":D},"text":X,"time":TS,"type":T}

use std::fmt;

/// A measurement reading. Integer and decimal readings serialize as
/// bare JSON numbers either way; the split mirrors how callers hold
/// them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Integer(i64),
    Decimal(f64),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Integer(v) => write!(f, "{v}"),
            SampleValue::Decimal(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Integer(v)
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Decimal(v)
    }
}

/// Single-series measurement body
pub fn measurement(
    kind: &str,
    fragment: &str,
    series: &str,
    value: SampleValue,
    unit: Option<&str>,
    device_id: &str,
    time: &str,
) -> String {
    match unit {
        Some(unit) => format!(
            r#"{{"type":"{kind}","{fragment}":{{"{series}":{{"value":{value},"unit":"{unit}"}}}},"source":{{"id":"{device_id}"}},"time":"{time}"}}"#
        ),
        None => format!(
            r#"{{"type":"{kind}","{fragment}":{{"{series}":{{"value":{value}}}}},"source":{{"id":"{device_id}"}},"time":"{time}"}}"#
        ),
    }
}

/// Alarm body
pub fn alarm(severity: &str, text: &str, kind: &str, device_id: &str, time: &str) -> String {
    format!(
        r#"{{"severity":"{severity}","source":{{"id":"{device_id}"}},"text":"{text}","time":"{time}","type":"{kind}"}}"#
    )
}

/// Event body
pub fn event(kind: &str, text: &str, device_id: &str, time: &str) -> String {
    format!(
        r#"{{"source":{{"id":"{device_id}"}},"text":"{text}","time":"{time}","type":"{kind}"}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_integer() {
        let body = measurement(
            "c8y_TemperatureMeasurement",
            "c8y_Temperature",
            "T",
            SampleValue::Integer(23),
            None,
            "4711",
            "2026-08-06T12:30:05Z",
        );
        assert_eq!(
            body,
            r#"{"type":"c8y_TemperatureMeasurement","c8y_Temperature":{"T":{"value":23}},"source":{"id":"4711"},"time":"2026-08-06T12:30:05Z"}"#
        );
    }

    #[test]
    fn test_measurement_decimal_with_unit() {
        let body = measurement(
            "c8y_TemperatureMeasurement",
            "c8y_Temperature",
            "T",
            SampleValue::Decimal(22.5),
            Some("C"),
            "4711",
            "2026-08-06T12:30:05Z",
        );
        assert_eq!(
            body,
            r#"{"type":"c8y_TemperatureMeasurement","c8y_Temperature":{"T":{"value":22.5,"unit":"C"}},"source":{"id":"4711"},"time":"2026-08-06T12:30:05Z"}"#
        );
    }

    #[test]
    fn test_alarm_template() {
        let body = alarm(
            "MAJOR",
            "Temperature out of range",
            "c8y_TemperatureAlarm",
            "4711",
            "2026-08-06T12:30:05Z",
        );
        assert_eq!(
            body,
            r#"{"severity":"MAJOR","source":{"id":"4711"},"text":"Temperature out of range","time":"2026-08-06T12:30:05Z","type":"c8y_TemperatureAlarm"}"#
        );
    }

    #[test]
    fn test_event_template() {
        let body = event(
            "c8y_DoorOpenedEvent",
            "Door opened",
            "4711",
            "2026-08-06T12:30:05Z",
        );
        assert_eq!(
            body,
            r#"{"source":{"id":"4711"},"text":"Door opened","time":"2026-08-06T12:30:05Z","type":"c8y_DoorOpenedEvent"}"#
        );
    }

    #[test]
    fn test_sample_value_display() {
        assert_eq!(SampleValue::Integer(-4).to_string(), "-4");
        assert_eq!(SampleValue::Decimal(22.5).to_string(), "22.5");
        assert_eq!(SampleValue::Decimal(22.0).to_string(), "22");
    }
}
