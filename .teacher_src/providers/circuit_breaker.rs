//! Circuit breaker pattern implementation for provider resilience.
//!
//! The circuit breaker prevents hammering unhealthy providers by tracking failures
//! and temporarily rejecting requests after a threshold is exceeded.
//!
//! # States
//!
//! - **Closed**: Normal operation. Requests pass through, failures are tracked.
//! - **Open**: After threshold failures, requests are rejected immediately.
//! - **Half-Open**: After timeout, limited probe requests test recovery.
//!
//! # Usage
//!
//! ```rust,ignore
//! let breaker = CircuitBreaker::new(&config);
//!
//! // Before making request
//! breaker.check()?;
//!
//! // After request completes
//! if response.status().is_success() {
//!     breaker.record_success();
//! } else if config.is_failure_status(response.status().as_u16()) {
//!     breaker.record_failure();
//! }
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::CircuitBreakerConfig,
    events::{CircuitBreakerState as EventCBState, EventBus, ServerEvent},
    observability::metrics,
};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through.
    Closed,
    /// Circuit tripped - requests are rejected.
    Open,
    /// Testing recovery - limited requests allowed.
    HalfOpen,
}

/// Error returned when the circuit breaker is open.
#[derive(Debug, Error)]
pub enum CircuitBreakerError {
    #[error(
        "Circuit breaker is open for provider '{provider}' - rejecting request (will retry at {retry_after_secs}s)"
    )]
    Open {
        provider: Arc<str>,
        retry_after_secs: u64,
    },
}

// State encoding: upper 2 bits = state, lower 30 bits = counter
const STATE_CLOSED: u32 = 0;
const STATE_OPEN: u32 = 1;
const STATE_HALF_OPEN: u32 = 2;
const STATE_SHIFT: u32 = 30;
const COUNTER_MASK: u32 = (1 << STATE_SHIFT) - 1;

/// Thread-safe circuit breaker.
///
/// Uses atomic operations for lock-free state management.
pub struct CircuitBreaker {
    /// Provider name for logging.
    provider_name: Arc<str>,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// Packed state: upper 2 bits = state, lower 30 bits = failure/success count.
    state_and_counter: AtomicU32,
    /// Timestamp when the circuit was opened (millis since UNIX epoch).
    opened_at: AtomicU64,
    /// Current open timeout in milliseconds (adaptive backoff).
    current_timeout_millis: AtomicU64,
    /// Number of consecutive times the circuit has opened without successful recovery.
    /// Used for exponential backoff calculation.
    consecutive_opens: AtomicU32,
    /// Optional event bus for broadcasting state changes.
    event_bus: Option<Arc<EventBus>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(provider_name: impl Into<Arc<str>>, config: &CircuitBreakerConfig) -> Self {
        let initial_timeout_millis = config.open_timeout_secs * 1000;
        Self {
            provider_name: provider_name.into(),
            config: config.clone(),
            state_and_counter: AtomicU32::new(pack_state(STATE_CLOSED, 0)),
            opened_at: AtomicU64::new(0),
            current_timeout_millis: AtomicU64::new(initial_timeout_millis),
            consecutive_opens: AtomicU32::new(0),
            event_bus: None,
        }
    }

    /// Create a new circuit breaker with EventBus for real-time state change notifications.
    pub fn with_event_bus(
        provider_name: impl Into<Arc<str>>,
        config: &CircuitBreakerConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let initial_timeout_millis = config.open_timeout_secs * 1000;
        Self {
            provider_name: provider_name.into(),
            config: config.clone(),
            state_and_counter: AtomicU32::new(pack_state(STATE_CLOSED, 0)),
            opened_at: AtomicU64::new(0),
            current_timeout_millis: AtomicU64::new(initial_timeout_millis),
            consecutive_opens: AtomicU32::new(0),
            event_bus: Some(event_bus),
        }
    }

    /// Check if a request is allowed through the circuit breaker.
    ///
    /// Returns `Ok(())` if the request can proceed, or `Err` if the circuit is open.
    pub fn check(&self) -> Result<(), CircuitBreakerError> {
        if !self.config.enabled {
            return Ok(());
        }

        let packed = self.state_and_counter.load(Ordering::Acquire);
        let (state, _) = unpack_state(packed);

        match state {
            STATE_CLOSED => Ok(()),
            STATE_OPEN => {
                // Check if timeout has elapsed (using adaptive timeout)
                let opened_at = self.opened_at.load(Ordering::Acquire);
                let now = current_time_millis();
                let timeout_millis = self.current_timeout_millis.load(Ordering::Acquire);

                if now >= opened_at + timeout_millis {
                    // Transition to half-open
                    self.transition_to_half_open();
                    Ok(())
                } else {
                    let retry_after = (opened_at + timeout_millis - now) / 1000;
                    Err(CircuitBreakerError::Open {
                        provider: self.provider_name.clone(),
                        retry_after_secs: retry_after,
                    })
                }
            }
            STATE_HALF_OPEN => {
                // Allow request through for testing
                Ok(())
            }
            _ => Ok(()), // Unknown state, allow through
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }

        loop {
            let packed = self.state_and_counter.load(Ordering::Acquire);
            let (state, counter) = unpack_state(packed);

            match state {
                STATE_CLOSED => {
                    // Reset failure counter on success
                    if counter > 0 {
                        let new_packed = pack_state(STATE_CLOSED, 0);
                        if self
                            .state_and_counter
                            .compare_exchange_weak(
                                packed,
                                new_packed,
                                Ordering::Release,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                        {
                            debug!(
                                provider = %self.provider_name,
                                "Circuit breaker: failure counter reset after success"
                            );
                            // Reset failure count metric
                            metrics::record_circuit_breaker_failures(
                                &self.provider_name,
                                0,
                                self.config.failure_threshold,
                            );
                        }
                        // If CAS failed, another thread modified state - that's fine, retry if needed
                    }
                    return;
                }
                STATE_HALF_OPEN => {
                    let new_counter = counter + 1;
                    if new_counter >= self.config.success_threshold {
                        // Enough successes, close the circuit
                        self.transition_to_closed();
                        return;
                    }
                    // Increment success counter atomically
                    let new_packed = pack_state(STATE_HALF_OPEN, new_counter);
                    if self
                        .state_and_counter
                        .compare_exchange_weak(
                            packed,
                            new_packed,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        debug!(
                            provider = %self.provider_name,
                            successes = new_counter,
                            threshold = self.config.success_threshold,
                            "Circuit breaker: successful probe"
                        );
                        return;
                    }
                    // CAS failed, retry
                    std::hint::spin_loop();
                }
                _ => return,
            }
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }

        loop {
            let packed = self.state_and_counter.load(Ordering::Acquire);
            let (state, counter) = unpack_state(packed);

            match state {
                STATE_CLOSED => {
                    let new_counter = counter + 1;
                    if new_counter >= self.config.failure_threshold {
                        // Threshold exceeded, open the circuit
                        self.transition_to_open();
                        return;
                    }
                    // Increment failure counter atomically
                    let new_packed = pack_state(STATE_CLOSED, new_counter);
                    if self
                        .state_and_counter
                        .compare_exchange_weak(
                            packed,
                            new_packed,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        debug!(
                            provider = %self.provider_name,
                            failures = new_counter,
                            threshold = self.config.failure_threshold,
                            "Circuit breaker: failure recorded"
                        );
                        // Track failure count approaching threshold
                        metrics::record_circuit_breaker_failures(
                            &self.provider_name,
                            new_counter,
                            self.config.failure_threshold,
                        );
                        return;
                    }
                    // CAS failed, retry
                    std::hint::spin_loop();
                }
                STATE_HALF_OPEN => {
                    // Any failure in half-open state reopens the circuit
                    self.transition_to_open();
                    return;
                }
                _ => return,
            }
        }
    }

    /// Get the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        if !self.config.enabled {
            return CircuitState::Closed;
        }

        let packed = self.state_and_counter.load(Ordering::Acquire);
        let (state, _) = unpack_state(packed);

        // Check for state transition on read (using adaptive timeout)
        if state == STATE_OPEN {
            let opened_at = self.opened_at.load(Ordering::Acquire);
            let now = current_time_millis();
            let timeout_millis = self.current_timeout_millis.load(Ordering::Acquire);

            if now >= opened_at + timeout_millis {
                return CircuitState::HalfOpen;
            }
        }

        match state {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Get the number of consecutive opens (for metrics/debugging).
    pub fn consecutive_opens(&self) -> u32 {
        self.consecutive_opens.load(Ordering::Acquire)
    }

    /// Get the current open timeout in seconds (for metrics/debugging).
    pub fn current_timeout_secs(&self) -> u64 {
        self.current_timeout_millis.load(Ordering::Acquire) / 1000
    }

    /// Get the failure count (for metrics/debugging).
    pub fn failure_count(&self) -> u32 {
        let packed = self.state_and_counter.load(Ordering::Acquire);
        let (state, counter) = unpack_state(packed);
        if state == STATE_CLOSED { counter } else { 0 }
    }

    fn transition_to_open(&self) {
        let previous_state = self.state();

        // Increment consecutive opens for adaptive backoff
        let consecutive = self.consecutive_opens.fetch_add(1, Ordering::AcqRel);

        // Calculate adaptive timeout based on consecutive opens
        let timeout_secs = self.config.calculate_open_timeout_secs(consecutive);
        let timeout_millis = timeout_secs * 1000;
        self.current_timeout_millis
            .store(timeout_millis, Ordering::Release);

        self.opened_at
            .store(current_time_millis(), Ordering::Release);
        self.state_and_counter
            .store(pack_state(STATE_OPEN, 0), Ordering::Release);

        warn!(
            provider = %self.provider_name,
            timeout_secs = timeout_secs,
            consecutive_opens = consecutive + 1,
            base_timeout_secs = self.config.open_timeout_secs,
            "Circuit breaker OPENED - provider marked unhealthy"
        );
        metrics::record_circuit_breaker_state(&self.provider_name, "open");
        metrics::record_circuit_breaker_consecutive_opens(&self.provider_name, consecutive + 1);
        // Reset failure count metric when circuit opens
        metrics::record_circuit_breaker_failures(
            &self.provider_name,
            0,
            self.config.failure_threshold,
        );
        // Publish state change event
        self.publish_state_change(previous_state, CircuitState::Open);
    }

    fn transition_to_half_open(&self) {
        let previous_state = self.state();
        self.state_and_counter
            .store(pack_state(STATE_HALF_OPEN, 0), Ordering::Release);
        info!(
            provider = %self.provider_name,
            "Circuit breaker HALF-OPEN - testing recovery"
        );
        metrics::record_circuit_breaker_state(&self.provider_name, "half_open");
        // Publish state change event
        self.publish_state_change(previous_state, CircuitState::HalfOpen);
    }

    fn transition_to_closed(&self) {
        let previous_state = self.state();

        // Reset adaptive backoff state on successful recovery
        let previous_consecutive = self.consecutive_opens.swap(0, Ordering::AcqRel);
        let initial_timeout_millis = self.config.open_timeout_secs * 1000;
        self.current_timeout_millis
            .store(initial_timeout_millis, Ordering::Release);

        self.state_and_counter
            .store(pack_state(STATE_CLOSED, 0), Ordering::Release);

        info!(
            provider = %self.provider_name,
            previous_consecutive_opens = previous_consecutive,
            "Circuit breaker CLOSED - provider recovered"
        );
        metrics::record_circuit_breaker_state(&self.provider_name, "closed");
        metrics::record_circuit_breaker_consecutive_opens(&self.provider_name, 0);
        // Reset failure count metric when circuit closes
        metrics::record_circuit_breaker_failures(
            &self.provider_name,
            0,
            self.config.failure_threshold,
        );
        // Publish state change event
        self.publish_state_change(previous_state, CircuitState::Closed);
    }

    /// Publish a state change event to the EventBus.
    fn publish_state_change(&self, previous_state: CircuitState, new_state: CircuitState) {
        if let Some(event_bus) = &self.event_bus {
            let packed = self.state_and_counter.load(Ordering::Acquire);
            let (_, counter) = unpack_state(packed);

            event_bus.publish(ServerEvent::CircuitBreakerStateChanged {
                provider: self.provider_name.to_string(),
                timestamp: Utc::now(),
                previous_state: circuit_state_to_event(previous_state),
                new_state: circuit_state_to_event(new_state),
                failure_count: counter,
                success_count: if new_state == CircuitState::Closed {
                    counter
                } else {
                    0
                },
            });
        }
    }
}

/// Convert local CircuitState to events module CircuitBreakerState.
fn circuit_state_to_event(state: CircuitState) -> EventCBState {
    match state {
        CircuitState::Closed => EventCBState::Closed,
        CircuitState::Open => EventCBState::Open,
        CircuitState::HalfOpen => EventCBState::HalfOpen,
    }
}

fn pack_state(state: u32, counter: u32) -> u32 {
    (state << STATE_SHIFT) | (counter & COUNTER_MASK)
}

fn unpack_state(packed: u32) -> (u32, u32) {
    let state = packed >> STATE_SHIFT;
    let counter = packed & COUNTER_MASK;
    (state, counter)
}

fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
