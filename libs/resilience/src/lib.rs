/// Resilience patterns for the event publishing pipeline
///
/// This library provides the controllers that keep the relay and the direct
/// publisher well-behaved while the broker misbehaves:
/// - **Circuit Breaker**: health-aware gate over a trailing window of send
///   outcomes; shields the database from unproductive row-locking during
///   broker outages
/// - **Retry**: attempt-count exponential backoff with jitter for transient
///   failures
/// - **Timeout**: hard time bounds on external calls
/// - **Preset Configurations**: pre-tuned settings for the broker and the
///   database
///
/// # Example: gating sends on broker health
///
/// ```rust
/// use resilience::{CircuitBreaker, CircuitBreakerConfig, Permit};
///
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
///
/// match breaker.acquire() {
///     Some(Permit::Full) => { /* send the whole batch */ }
///     Some(Permit::Probe) => { /* half-open: send a single probe record */ }
///     None => { /* open: skip the broker entirely this round */ }
/// }
/// breaker.record_success();
/// ```
///
/// # Example: bounded retry around a send
///
/// ```rust,no_run
/// use resilience::{with_retry, RetryConfig};
///
/// # async fn demo() {
/// let result = with_retry(RetryConfig::default(), || async {
///     // Your broker call here
///     Ok::<_, String>(())
/// })
/// .await;
/// # }
/// ```
pub mod circuit_breaker;
pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Permit};
pub use presets::{database_config, kafka_config, ServiceConfig};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
