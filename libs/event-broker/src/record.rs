/// Broker acknowledgement: where the record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerAck {
    pub partition: i32,
    pub offset: i64,
}

/// One record bound for the broker.
///
/// The key is the event id (partitioning and consumer-side dedupe both hang
/// off it); the value is the serialized envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub key: String,
    pub payload: String,
    pub headers: Vec<(String, String)>,
}

impl BrokerRecord {
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload: payload.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Extract downstream-propagation headers from a serialized envelope.
///
/// Pulls `correlation_id`, `causation_id` and `root_event_id` out of the
/// envelope's source metadata. Lenient: a payload that is not an envelope
/// (or predates the metadata shape) yields no headers.
pub fn correlation_headers(envelope_json: &str) -> Vec<(String, String)> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(envelope_json) else {
        return Vec::new();
    };

    let source = &value["metadata"]["source"];
    ["correlation_id", "causation_id", "root_event_id"]
        .iter()
        .filter_map(|key| {
            source[key]
                .as_str()
                .map(|v| (key.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_accumulates_headers() {
        let record = BrokerRecord::new("orders", "42", "{}")
            .header("event_type", "ORDER_CREATED")
            .headers(vec![("a".to_string(), "1".to_string())]);

        assert_eq!(record.headers.len(), 2);
        assert_eq!(record.headers[0].0, "event_type");
    }

    #[test]
    fn correlation_headers_extracts_present_ids() {
        let raw = r#"{
            "metadata": {
                "source": {
                    "service": "svc",
                    "correlation_id": "c-1",
                    "root_event_id": "r-1"
                }
            }
        }"#;

        let headers = correlation_headers(raw);
        assert_eq!(
            headers,
            vec![
                ("correlation_id".to_string(), "c-1".to_string()),
                ("root_event_id".to_string(), "r-1".to_string()),
            ]
        );
    }

    #[test]
    fn correlation_headers_tolerates_foreign_payloads() {
        assert!(correlation_headers("not json").is_empty());
        assert!(correlation_headers(r#"{"plain": true}"#).is_empty());
    }
}
