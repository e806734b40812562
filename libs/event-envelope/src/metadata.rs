use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ambient context captured alongside every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: Source,
    pub actor: Actor,
    pub trace: Trace,
    pub schema: SchemaInfo,
    tags: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(
        source: Source,
        actor: Actor,
        trace: Trace,
        schema: SchemaInfo,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            source,
            actor,
            trace,
            schema,
            // Defensive copy: callers keep no handle into the stored map.
            tags: tags.clone(),
        }
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Where the event was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Logical service name; the one required field.
    pub service: String,
    /// Active deployment profiles joined by comma (e.g. `"prod,eu"`).
    pub environment: String,
    pub instance_id: String,
    pub host: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_event_id: Option<String>,
}

/// Who triggered the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
    pub ip: String,
}

impl Actor {
    pub const SYSTEM_ID: &'static str = "SYSTEM";
    pub const SYSTEM_ROLE: &'static str = "ROLE_SYSTEM";

    /// The fallback actor for work with no authenticated principal.
    pub fn system(ip: impl Into<String>) -> Self {
        Self {
            id: Self::SYSTEM_ID.to_string(),
            role: Self::SYSTEM_ROLE.to_string(),
            ip: ip.into(),
        }
    }
}

/// Distributed-trace linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Payload schema identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    /// At least 1.
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
}

impl SchemaInfo {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            schema_id: None,
        }
    }

    pub fn with_schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    /// Fallback schema for payload types without an explicit declaration.
    pub fn fallback(type_name: &str) -> Self {
        Self::new(type_name, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_copies_tags_defensively() {
        let mut tags = BTreeMap::new();
        tags.insert("tenant".to_string(), "acme".to_string());

        let metadata = Metadata::new(
            Source {
                service: "svc".into(),
                environment: "test".into(),
                instance_id: "i-1".into(),
                host: "localhost".into(),
                version: "0.1.0".into(),
                correlation_id: None,
                causation_id: None,
                root_event_id: None,
            },
            Actor::system("127.0.0.1"),
            Trace {
                trace_id: "t".into(),
                span_id: "s".into(),
                correlation_id: None,
            },
            SchemaInfo::new("Order", 1),
            tags.clone(),
        );

        tags.insert("region".to_string(), "eu".to_string());
        assert_eq!(metadata.tags().len(), 1);
        assert_eq!(metadata.tags().get("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn absent_optionals_are_omitted_from_json() {
        let source = Source {
            service: "svc".into(),
            environment: "test".into(),
            instance_id: "i-1".into(),
            host: "localhost".into(),
            version: "0.1.0".into(),
            correlation_id: None,
            causation_id: None,
            root_event_id: None,
        };
        let json = serde_json::to_string(&source).unwrap();
        assert!(!json.contains("correlation_id"));
        assert!(!json.contains("root_event_id"));
    }
}
