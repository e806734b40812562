//! Task-local diagnostic context.
//!
//! The Rust analog of an MDC: a per-task key/value map that request
//! middleware seeds and the metadata providers read. The context is an
//! explicit value (`ContextMap`) bound to a task scope — there is no
//! process-global state, and the binding is removed when the scoped future
//! completes or is dropped.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;

/// Snapshot of the diagnostic context; plain data, cheap to clone.
pub type ContextMap = BTreeMap<String, String>;

/// Well-known context keys.
pub mod keys {
    pub const TRACE_ID: &str = "traceId";
    pub const SPAN_ID: &str = "spanId";
    pub const CORRELATION_ID: &str = "correlationId";
    pub const CAUSATION_ID: &str = "causationId";
    pub const ROOT_EVENT_ID: &str = "rootEventId";
    pub const REMOTE_ADDR: &str = "remoteAddr";
}

tokio::task_local! {
    static CURRENT: RefCell<ContextMap>;
}

/// Accessors for the current task's diagnostic context.
///
/// All reads are safe outside a scope and behave as if the map were empty;
/// writes outside a scope are dropped (and reported via the return value).
pub struct DiagnosticContext;

impl DiagnosticContext {
    /// Run `fut` with `seed` bound as its diagnostic context.
    pub async fn scope<F>(seed: ContextMap, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(RefCell::new(seed), fut).await
    }

    /// Synchronous variant of [`DiagnosticContext::scope`].
    pub fn sync_scope<F, R>(seed: ContextMap, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(RefCell::new(seed), f)
    }

    pub fn get(key: &str) -> Option<String> {
        CURRENT
            .try_with(|ctx| ctx.borrow().get(key).cloned())
            .ok()
            .flatten()
    }

    /// Returns `false` when no context scope is active.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> bool {
        CURRENT
            .try_with(|ctx| {
                ctx.borrow_mut().insert(key.into(), value.into());
            })
            .is_ok()
    }

    pub fn remove(key: &str) {
        let _ = CURRENT.try_with(|ctx| {
            ctx.borrow_mut().remove(key);
        });
    }

    /// Copy of the current context; empty outside any scope.
    pub fn snapshot() -> ContextMap {
        CURRENT
            .try_with(|ctx| ctx.borrow().clone())
            .unwrap_or_default()
    }

    /// Bind the correlation trio for events assembled in this task.
    pub fn set_correlation(
        correlation_id: &str,
        causation_id: Option<&str>,
        root_event_id: Option<&str>,
    ) {
        Self::put(keys::CORRELATION_ID, correlation_id);
        match causation_id {
            Some(id) => {
                Self::put(keys::CAUSATION_ID, id);
            }
            None => Self::remove(keys::CAUSATION_ID),
        }
        match root_event_id {
            Some(id) => {
                Self::put(keys::ROOT_EVENT_ID, id);
            }
            None => Self::remove(keys::ROOT_EVENT_ID),
        }
    }

    /// Remove all three correlation keys.
    pub fn clear_correlation() {
        Self::remove(keys::CORRELATION_ID);
        Self::remove(keys::CAUSATION_ID);
        Self::remove(keys::ROOT_EVENT_ID);
    }
}

/// Task decorator for context propagation across spawns.
///
/// Captures the submitting task's context at call time and restores it
/// around `fut`; the binding is cleared when the returned future finishes.
///
/// ```rust,no_run
/// # async fn publish_async() {}
/// # async fn demo() {
/// tokio::spawn(event_envelope::propagate(async {
///     publish_async().await;
/// }));
/// # }
/// ```
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let captured = DiagnosticContext::snapshot();
    DiagnosticContext::scope(captured, fut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_outside_scope_are_empty() {
        assert_eq!(DiagnosticContext::get(keys::TRACE_ID), None);
        assert!(DiagnosticContext::snapshot().is_empty());
        assert!(!DiagnosticContext::put(keys::TRACE_ID, "t-1"));
    }

    #[tokio::test]
    async fn scope_binds_and_clears() {
        let mut seed = ContextMap::new();
        seed.insert(keys::TRACE_ID.to_string(), "t-1".to_string());

        DiagnosticContext::scope(seed, async {
            assert_eq!(DiagnosticContext::get(keys::TRACE_ID).as_deref(), Some("t-1"));
            assert!(DiagnosticContext::put(keys::SPAN_ID, "s-1"));
            assert_eq!(DiagnosticContext::get(keys::SPAN_ID).as_deref(), Some("s-1"));
        })
        .await;

        // Scope exited: nothing leaks into the enclosing task.
        assert_eq!(DiagnosticContext::get(keys::TRACE_ID), None);
        assert_eq!(DiagnosticContext::get(keys::SPAN_ID), None);
    }

    #[tokio::test]
    async fn correlation_trio_set_and_clear() {
        DiagnosticContext::scope(ContextMap::new(), async {
            DiagnosticContext::set_correlation("c-1", Some("cause-1"), Some("root-1"));
            assert_eq!(
                DiagnosticContext::get(keys::CORRELATION_ID).as_deref(),
                Some("c-1")
            );
            assert_eq!(
                DiagnosticContext::get(keys::CAUSATION_ID).as_deref(),
                Some("cause-1")
            );
            assert_eq!(
                DiagnosticContext::get(keys::ROOT_EVENT_ID).as_deref(),
                Some("root-1")
            );

            DiagnosticContext::clear_correlation();
            assert_eq!(DiagnosticContext::get(keys::CORRELATION_ID), None);
            assert_eq!(DiagnosticContext::get(keys::CAUSATION_ID), None);
            assert_eq!(DiagnosticContext::get(keys::ROOT_EVENT_ID), None);
        })
        .await;
    }

    #[tokio::test]
    async fn propagate_carries_context_across_spawn() {
        let mut seed = ContextMap::new();
        seed.insert(keys::TRACE_ID.to_string(), "t-42".to_string());

        DiagnosticContext::scope(seed, async {
            let handle = tokio::spawn(propagate(async {
                DiagnosticContext::get(keys::TRACE_ID)
            }));
            assert_eq!(handle.await.unwrap().as_deref(), Some("t-42"));
        })
        .await;
    }

    #[tokio::test]
    async fn spawn_without_propagate_sees_nothing() {
        let mut seed = ContextMap::new();
        seed.insert(keys::TRACE_ID.to_string(), "t-42".to_string());

        DiagnosticContext::scope(seed, async {
            let handle = tokio::spawn(async { DiagnosticContext::get(keys::TRACE_ID) });
            assert_eq!(handle.await.unwrap(), None);
        })
        .await;
    }
}
