//! Metadata subproviders.
//!
//! Each provider captures one slice of ambient context; [`MetadataProvider`]
//! composes them into the [`Metadata`] attached to every envelope. Reads go
//! through the task-local [`DiagnosticContext`] and are null-safe: missing
//! keys degrade to documented defaults rather than failing assembly.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use dashmap::DashMap;

use crate::context::{keys, DiagnosticContext};
use crate::envelope::EventPayload;
use crate::metadata::{Actor, Metadata, SchemaInfo, Source, Trace};

/// An authenticated caller, when the host application has one.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub role: String,
}

/// Hook for the host application's authentication layer.
pub trait PrincipalSource: Send + Sync {
    fn current(&self) -> Option<Principal>;
}

/// Resolves the acting identity for the current task.
#[derive(Default)]
pub struct ActorProvider {
    principal: Option<Arc<dyn PrincipalSource>>,
}

impl ActorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal_source(principal: Arc<dyn PrincipalSource>) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn current_actor(&self) -> Actor {
        let ip = DiagnosticContext::get(keys::REMOTE_ADDR)
            .unwrap_or_else(|| "127.0.0.1".to_string());

        match self.principal.as_ref().and_then(|source| source.current()) {
            Some(principal) => Actor {
                id: principal.id,
                role: principal.role,
                ip,
            },
            None => Actor::system(ip),
        }
    }
}

/// Reads trace linkage from the diagnostic context.
pub struct TraceProvider;

impl TraceProvider {
    const UNKNOWN: &'static str = "unknown";

    pub fn current_trace() -> Trace {
        Trace {
            trace_id: DiagnosticContext::get(keys::TRACE_ID)
                .unwrap_or_else(|| Self::UNKNOWN.to_string()),
            span_id: DiagnosticContext::get(keys::SPAN_ID)
                .unwrap_or_else(|| Self::UNKNOWN.to_string()),
            correlation_id: DiagnosticContext::get(keys::CORRELATION_ID),
        }
    }
}

/// Process identity, resolved once at startup.
///
/// Instance id comes from `$HOSTNAME` (container orchestrators set it) with
/// a random UUID fallback; host falls back to `"unknown"` when the OS
/// refuses to name itself.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    template: Source,
}

impl SourceResolver {
    pub fn resolve(service: &str, profiles: &[String], version: &str) -> Self {
        let instance_id = env::var("HOSTNAME")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            template: Source {
                service: service.to_string(),
                environment: profiles.join(","),
                instance_id,
                host,
                version: version.to_string(),
                correlation_id: None,
                causation_id: None,
                root_event_id: None,
            },
        }
    }

    /// The static template plus the current task's correlation trio.
    pub fn current_source(&self) -> Source {
        let mut source = self.template.clone();
        source.correlation_id = DiagnosticContext::get(keys::CORRELATION_ID);
        source.causation_id = DiagnosticContext::get(keys::CAUSATION_ID);
        source.root_event_id = DiagnosticContext::get(keys::ROOT_EVENT_ID);
        source
    }
}

/// Extracts a configured key set from the diagnostic context.
pub struct TagProvider {
    keys: Vec<String>,
}

impl Default for TagProvider {
    fn default() -> Self {
        Self {
            keys: vec!["region".to_string(), "tenant".to_string()],
        }
    }
}

impl TagProvider {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn current_tags(&self) -> BTreeMap<String, String> {
        self.keys
            .iter()
            .filter_map(|key| DiagnosticContext::get(key).map(|value| (key.clone(), value)))
            .collect()
    }
}

/// Per-payload-type schema identity with a process-wide cache.
#[derive(Default)]
pub struct SchemaResolver {
    cache: DashMap<TypeId, SchemaInfo>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<P: EventPayload + 'static>(&self) -> SchemaInfo {
        self.cache
            .entry(TypeId::of::<P>())
            .or_insert_with(P::schema)
            .clone()
    }

    pub fn cached_types(&self) -> usize {
        self.cache.len()
    }
}

/// Composes the subproviders into per-event [`Metadata`].
pub struct MetadataProvider {
    actor: ActorProvider,
    source: SourceResolver,
    tags: TagProvider,
    schemas: SchemaResolver,
}

impl MetadataProvider {
    pub fn new(source: SourceResolver) -> Self {
        Self {
            actor: ActorProvider::new(),
            source,
            tags: TagProvider::default(),
            schemas: SchemaResolver::new(),
        }
    }

    pub fn with_principal_source(mut self, principal: Arc<dyn PrincipalSource>) -> Self {
        self.actor = ActorProvider::with_principal_source(principal);
        self
    }

    pub fn with_tag_keys(mut self, keys: Vec<String>) -> Self {
        self.tags = TagProvider::new(keys);
        self
    }

    pub fn current_metadata<P: EventPayload + 'static>(&self) -> Metadata {
        Metadata::new(
            self.source.current_source(),
            self.actor.current_actor(),
            TraceProvider::current_trace(),
            self.schemas.resolve::<P>(),
            self.tags.current_tags(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextMap;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample;

    impl EventPayload for Sample {
        fn event_type(&self) -> &str {
            "SAMPLE"
        }
    }

    #[derive(Serialize)]
    struct Declared;

    impl EventPayload for Declared {
        fn event_type(&self) -> &str {
            "DECLARED"
        }

        fn schema() -> SchemaInfo {
            SchemaInfo::new("declared-v2", 2).with_schema_id("sch-17")
        }
    }

    #[tokio::test]
    async fn actor_defaults_to_system_with_loopback() {
        let actor = ActorProvider::new().current_actor();
        assert_eq!(actor.id, "SYSTEM");
        assert_eq!(actor.role, "ROLE_SYSTEM");
        assert_eq!(actor.ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn actor_uses_remote_addr_and_principal() {
        struct FixedPrincipal;
        impl PrincipalSource for FixedPrincipal {
            fn current(&self) -> Option<Principal> {
                Some(Principal {
                    id: "user-7".to_string(),
                    role: "ROLE_ADMIN".to_string(),
                })
            }
        }

        let mut seed = ContextMap::new();
        seed.insert(keys::REMOTE_ADDR.to_string(), "10.0.0.9".to_string());

        DiagnosticContext::scope(seed, async {
            let actor =
                ActorProvider::with_principal_source(Arc::new(FixedPrincipal)).current_actor();
            assert_eq!(actor.id, "user-7");
            assert_eq!(actor.role, "ROLE_ADMIN");
            assert_eq!(actor.ip, "10.0.0.9");
        })
        .await;
    }

    #[tokio::test]
    async fn trace_falls_back_to_unknown() {
        let trace = TraceProvider::current_trace();
        assert_eq!(trace.trace_id, "unknown");
        assert_eq!(trace.span_id, "unknown");
        assert_eq!(trace.correlation_id, None);
    }

    #[tokio::test]
    async fn tags_pick_only_present_keys() {
        let mut seed = ContextMap::new();
        seed.insert("tenant".to_string(), "acme".to_string());

        DiagnosticContext::scope(seed, async {
            let tags = TagProvider::default().current_tags();
            assert_eq!(tags.len(), 1);
            assert_eq!(tags.get("tenant").map(String::as_str), Some("acme"));
            assert!(!tags.contains_key("region"));
        })
        .await;
    }

    #[test]
    fn schema_fallback_and_override() {
        let resolver = SchemaResolver::new();

        let fallback = resolver.resolve::<Sample>();
        assert_eq!(fallback.name, "Sample");
        assert_eq!(fallback.version, 1);
        assert_eq!(fallback.schema_id, None);

        let declared = resolver.resolve::<Declared>();
        assert_eq!(declared.name, "declared-v2");
        assert_eq!(declared.version, 2);
        assert_eq!(declared.schema_id.as_deref(), Some("sch-17"));
    }

    #[test]
    fn schema_resolution_is_cached_per_type() {
        let resolver = SchemaResolver::new();
        resolver.resolve::<Sample>();
        resolver.resolve::<Sample>();
        resolver.resolve::<Declared>();
        assert_eq!(resolver.cached_types(), 2);
    }

    #[test]
    fn source_resolver_joins_profiles() {
        let resolver = SourceResolver::resolve(
            "svc",
            &["prod".to_string(), "eu-west".to_string()],
            "1.0.0",
        );
        let source = DiagnosticContext::sync_scope(ContextMap::new(), || resolver.current_source());
        assert_eq!(source.service, "svc");
        assert_eq!(source.environment, "prod,eu-west");
        assert!(!source.instance_id.is_empty());
        assert!(!source.host.is_empty());
    }

    #[tokio::test]
    async fn source_picks_up_correlation_trio() {
        let resolver = SourceResolver::resolve("svc", &[], "1.0.0");

        DiagnosticContext::scope(ContextMap::new(), async move {
            DiagnosticContext::set_correlation("c-9", Some("cause-9"), None);
            let source = resolver.current_source();
            assert_eq!(source.correlation_id.as_deref(), Some("c-9"));
            assert_eq!(source.causation_id.as_deref(), Some("cause-9"));
            assert_eq!(source.root_event_id, None);
        })
        .await;
    }
}
