// Wire format for telemetry batches written by the proxy
// Each connection carries one JSON array of compact request records
//
// Numan Thabit 2025 Nov

use crate::errors::Result;
use serde::Deserialize;

/// Marks a numeric field the proxy did not measure.
pub const SENTINEL: f64 = -1.0;

fn sentinel() -> f64 {
    SENTINEL
}

/// One completed request as reported by the proxy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "h", default)]
    pub host: String,
    #[serde(rename = "s", default)]
    pub status: String,

    #[serde(rename = "resL", default = "sentinel")]
    pub response_length: f64,

    #[serde(rename = "rL", default = "sentinel")]
    pub request_length: f64,
    #[serde(rename = "rT", default = "sentinel")]
    pub request_time: f64,

    #[serde(rename = "uL", default = "sentinel")]
    pub upstream_latency: f64,
    #[serde(rename = "uResL", default = "sentinel")]
    pub upstream_response_length: f64,
    #[serde(rename = "uResT", default = "sentinel")]
    pub upstream_response_time: f64,
    #[serde(rename = "uS", default)]
    pub upstream_status: String,

    #[serde(rename = "n", default)]
    pub namespace: String,
    #[serde(rename = "i", default)]
    pub ingress: String,
    #[serde(rename = "svc", default)]
    pub service: String,
    #[serde(rename = "p", default)]
    pub path: String,
}

impl RequestEvent {
    /// `namespace/ingress`, the unit of series deletion.
    pub fn route_key(&self) -> String {
        route_key(&self.namespace, &self.ingress)
    }
}

pub fn route_key(namespace: &str, ingress: &str) -> String {
    format!("{namespace}/{ingress}")
}

/// Returns the value unless it is the not-measured sentinel.
pub fn measured(value: f64) -> Option<f64> {
    if value == SENTINEL {
        None
    } else {
        Some(value)
    }
}

/// Decodes a whole batch. A malformed payload fails as a unit.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<RequestEvent>> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_short_field_names() {
        let payload = br#"[{"h":"a.com","s":"200","resL":512,"rL":90,"rT":0.5,
            "uL":0.1,"uResL":400,"uResT":0.2,"uS":"200",
            "n":"ns","i":"ing","svc":"svc-a","p":"/api"}]"#;

        let events = decode_batch(payload).unwrap();
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.host, "a.com");
        assert_eq!(ev.status, "200");
        assert_eq!(ev.response_length, 512.0);
        assert_eq!(ev.request_length, 90.0);
        assert_eq!(ev.request_time, 0.5);
        assert_eq!(ev.upstream_latency, 0.1);
        assert_eq!(ev.upstream_response_length, 400.0);
        assert_eq!(ev.upstream_response_time, 0.2);
        assert_eq!(ev.upstream_status, "200");
        assert_eq!(ev.service, "svc-a");
        assert_eq!(ev.path, "/api");
        assert_eq!(ev.route_key(), "ns/ing");
    }

    #[test]
    fn missing_fields_are_unmeasured() {
        let events = decode_batch(br#"[{"h":"a.com","s":"404","n":"ns","i":"ing"}]"#).unwrap();
        let ev = &events[0];
        assert_eq!(measured(ev.request_time), None);
        assert_eq!(measured(ev.upstream_latency), None);
        assert_eq!(measured(ev.response_length), None);
        assert!(ev.service.is_empty());
        assert!(ev.path.is_empty());
    }

    #[test]
    fn zero_is_a_measurement() {
        assert_eq!(measured(0.0), Some(0.0));
        assert_eq!(measured(-1.0), None);
    }

    #[test]
    fn malformed_batch_fails_whole() {
        assert!(decode_batch(b"not json").is_err());
        assert!(decode_batch(br#"{"h":"a.com"}"#).is_err());
        assert!(decode_batch(br#"[{"h":"a.com"}, {"h": 7}]"#).is_err());
        assert!(decode_batch(b"").is_err());
    }

    #[test]
    fn empty_batch_is_valid() {
        assert!(decode_batch(b"[]").unwrap().is_empty());
    }
}
