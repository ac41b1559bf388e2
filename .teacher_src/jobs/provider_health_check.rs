//! Provider health check background service.
//!
//! This module provides a background service that periodically checks the health
//! of configured providers. Health checks can use either:
//!
//! - **Reachability mode**: Calls the provider's `/models` endpoint (free, fast)
//! - **Inference mode**: Sends a minimal chat completion request (more thorough, costs money)
//!
//! Health status is stored and can be queried via the admin API. Health changes
//! are published to the EventBus for real-time monitoring.
//!
//! # Configuration
//!
//! Health checks are configured per-provider:
//!
//! ```toml
//! [providers.my-openai.health_check]
//! enabled = true
//! mode = "reachability"
//! interval_secs = 60
//! timeout_secs = 10
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Instant,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    events::{EventBus, ServerEvent},
    providers::{
        CircuitBreakerRegistry, Provider,
        health_check::{
            HealthCheckResult, HealthStatus, ProviderHealthCheckConfig, ProviderHealthCheckMode,
        },
    },
};

/// Stored health state for a single provider.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ProviderHealthState {
    /// Provider name.
    pub provider: String,
    /// Current health status.
    pub status: HealthStatus,
    /// Latency of the last health check in milliseconds.
    pub latency_ms: u64,
    /// Error message from the last failed health check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP status code from the last health check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Time of the last health check.
    pub last_check: DateTime<Utc>,
    /// Number of consecutive failures.
    pub consecutive_failures: u32,
    /// Number of consecutive successes.
    pub consecutive_successes: u32,
}

impl ProviderHealthState {
    /// Create a new health state with unknown status.
    fn new(provider: String) -> Self {
        Self {
            provider,
            status: HealthStatus::Unknown,
            latency_ms: 0,
            error: None,
            status_code: None,
            last_check: Utc::now(),
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    /// Update state from a health check result.
    fn update(&mut self, result: &HealthCheckResult) {
        let previous_status = self.status;
        self.status = result.status;
        self.latency_ms = result.latency_ms;
        self.error = result.error.clone();
        self.status_code = result.status_code;
        self.last_check = Utc::now();

        match result.status {
            HealthStatus::Healthy => {
                self.consecutive_failures = 0;
                self.consecutive_successes += 1;
            }
            HealthStatus::Unhealthy => {
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;
            }
            HealthStatus::Unknown => {
                // Keep counts as-is for unknown status
            }
        }

        // Log status transitions
        if previous_status != result.status && previous_status != HealthStatus::Unknown {
            tracing::info!(
                provider = %self.provider,
                previous = ?previous_status,
                current = ?result.status,
                latency_ms = result.latency_ms,
                error = ?result.error,
                "Provider health status changed"
            );
        }
    }

    /// Check if status changed from the previous state.
    fn status_changed(&self, previous: HealthStatus) -> bool {
        self.status != previous && previous != HealthStatus::Unknown
    }
}

/// Shared registry of provider health states.
///
/// This is a cloneable handle to the shared state that can be stored in `AppState`
/// for access by admin API endpoints, while also being used by `ProviderHealthChecker`
/// to update health status from background tasks.
///
/// # Example
///
/// ```ignore
/// // Create registry and store in AppState
/// let registry = ProviderHealthStateRegistry::new();
/// let state = AppState { health_registry: registry.clone(), ... };
///
/// // Pass to health checker
/// let checker = ProviderHealthChecker::with_registry(client, event_bus, circuit_breakers, registry);
///
/// // Query from admin endpoint
/// let all_health = state.health_registry.get_all();
/// ```
#[derive(Clone, Default)]
pub struct ProviderHealthStateRegistry {
    state: Arc<RwLock<HashMap<String, ProviderHealthState>>>,
}

impl ProviderHealthStateRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get health state for a specific provider.
    ///
    /// Returns `None` if the provider is not registered for health checks.
    pub fn get(&self, provider: &str) -> Option<ProviderHealthState> {
        let state = self.state.read().expect("RwLock poisoned");
        state.get(provider).cloned()
    }

    /// Get health state for all registered providers.
    ///
    /// Returns an empty vector if no providers are registered.
    pub fn get_all(&self) -> Vec<ProviderHealthState> {
        let state = self.state.read().expect("RwLock poisoned");
        state.values().cloned().collect()
    }

    /// Check if any providers are registered.
    pub fn is_empty(&self) -> bool {
        let state = self.state.read().expect("RwLock poisoned");
        state.is_empty()
    }

    /// Get the number of registered providers.
    pub fn len(&self) -> usize {
        let state = self.state.read().expect("RwLock poisoned");
        state.len()
    }

    /// Initialize a provider's health state (internal use).
    fn init_provider(&self, provider: String) {
        let mut state = self.state.write().expect("RwLock poisoned");
        state.insert(provider.clone(), ProviderHealthState::new(provider));
    }

    /// Update a provider's health state from a check result (internal use).
    ///
    /// Returns `true` if the status changed from the previous value.
    fn update_provider(&self, provider: &str, result: &HealthCheckResult) -> bool {
        let mut state = self.state.write().expect("RwLock poisoned");
        if let Some(provider_state) = state.get_mut(provider) {
            let previous_status = provider_state.status;
            provider_state.update(result);
            provider_state.status_changed(previous_status)
        } else {
            false
        }
    }
}

impl std::fmt::Debug for ProviderHealthStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("RwLock poisoned");
        f.debug_struct("ProviderHealthStateRegistry")
            .field("provider_count", &state.len())
            .finish()
    }
}

/// Internal entry for a provider being health-checked.
struct HealthCheckEntry {
    /// The provider instance.
    provider: Arc<dyn Provider>,
    /// Health check configuration.
    config: ProviderHealthCheckConfig,
}

/// Background service for checking provider health.
///
/// Spawns a background task per provider that runs health checks at configured
/// intervals. Health status is stored in a shared `ProviderHealthStateRegistry`
/// that can be queried via the admin API.
///
/// # Circuit Breaker Integration
///
/// Health check results are fed into the circuit breaker system:
/// - **Failures**: Always recorded as circuit breaker failures (provider is down)
/// - **Successes**: Only recorded for `Inference` mode checks (proves the model works)
///
/// This asymmetry ensures that a simple reachability check (which only verifies
/// the API endpoint is up) cannot prematurely close a circuit that was opened
/// due to actual inference failures.
pub struct ProviderHealthChecker {
    /// Providers to check, keyed by name.
    providers: HashMap<String, HealthCheckEntry>,
    /// Shared health state registry (can be stored in AppState for API access).
    registry: ProviderHealthStateRegistry,
    /// HTTP client for health check requests.
    client: reqwest::Client,
    /// Event bus for publishing health changes.
    event_bus: Option<Arc<EventBus>>,
    /// Circuit breaker registry for recording health check results.
    circuit_breakers: CircuitBreakerRegistry,
}

impl ProviderHealthChecker {
    /// Create a new health checker with an internal registry.
    ///
    /// Use `with_registry()` instead if you need to access health state from
    /// outside the checker (e.g., from admin API endpoints).
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client for health check requests
    /// * `event_bus` - Optional event bus for publishing health change events
    /// * `circuit_breakers` - Registry for recording health check results to circuit breakers
    #[allow(dead_code)] // Used in tests; production uses with_registry()
    pub fn new(
        client: reqwest::Client,
        event_bus: Option<Arc<EventBus>>,
        circuit_breakers: CircuitBreakerRegistry,
    ) -> Self {
        Self::with_registry(
            client,
            event_bus,
            circuit_breakers,
            ProviderHealthStateRegistry::new(),
        )
    }

    /// Create a new health checker with an external registry.
    ///
    /// The registry can be stored in `AppState` and queried by admin API endpoints
    /// while the checker runs in the background.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client for health check requests
    /// * `event_bus` - Optional event bus for publishing health change events
    /// * `circuit_breakers` - Registry for recording health check results to circuit breakers
    /// * `registry` - Shared health state registry
    pub fn with_registry(
        client: reqwest::Client,
        event_bus: Option<Arc<EventBus>>,
        circuit_breakers: CircuitBreakerRegistry,
        registry: ProviderHealthStateRegistry,
    ) -> Self {
        Self {
            providers: HashMap::new(),
            registry,
            client,
            event_bus,
            circuit_breakers,
        }
    }

    /// Register a provider for health checking.
    ///
    /// Only providers with `health_check.enabled = true` in their config should
    /// be registered. The config should be validated before registration.
    ///
    /// # Arguments
    ///
    /// * `name` - Provider name (used for logging and state lookup)
    /// * `provider` - The provider instance
    /// * `config` - Health check configuration
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        config: ProviderHealthCheckConfig,
    ) {
        let name = name.into();

        // Validate config
        if let Err(e) = config.validate() {
            tracing::error!(
                provider = %name,
                error = %e,
                "Invalid health check configuration, skipping registration"
            );
            return;
        }

        if !config.enabled {
            tracing::debug!(
                provider = %name,
                "Health checks disabled for provider, skipping registration"
            );
            return;
        }

        tracing::info!(
            provider = %name,
            mode = ?config.mode,
            interval_secs = config.interval_secs,
            timeout_secs = config.timeout_secs,
            "Registering provider for health checks"
        );

        // Initialize state in registry
        self.registry.init_provider(name.clone());

        self.providers
            .insert(name, HealthCheckEntry { provider, config });
    }

    /// Get the number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Check if any providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Get health state for a specific provider.
    #[allow(dead_code)] // Convenience method; production accesses registry directly
    pub fn get_health(&self, provider: &str) -> Option<ProviderHealthState> {
        self.registry.get(provider)
    }

    /// Get health state for all providers.
    #[allow(dead_code)] // Convenience method; production accesses registry directly
    pub fn get_all_health(&self) -> Vec<ProviderHealthState> {
        self.registry.get_all()
    }

    /// Start the health checker background tasks.
    ///
    /// Spawns a background task for each registered provider that runs health
    /// checks at the configured interval. This method consumes `self` and runs
    /// until all tasks complete (which is never under normal operation).
    ///
    /// If no providers are registered, this returns immediately.
    pub async fn start(self) {
        if self.providers.is_empty() {
            tracing::info!("No providers registered for health checks");
            return;
        }

        tracing::info!(
            provider_count = self.providers.len(),
            "Starting provider health checker"
        );

        let registry = self.registry;
        let event_bus = self.event_bus;
        let client = self.client;
        let circuit_breakers = self.circuit_breakers;

        // Spawn a task for each provider
        let mut handles = Vec::new();

        for (name, entry) in self.providers {
            let provider = entry.provider;
            let config = entry.config;
            let registry = registry.clone();
            let event_bus = event_bus.clone();
            let client = client.clone();
            let circuit_breakers = circuit_breakers.clone();

            let handle = tokio::spawn(async move {
                run_health_check_loop(
                    name,
                    provider,
                    config,
                    registry,
                    event_bus,
                    client,
                    circuit_breakers,
                )
                .await;
            });

            handles.push(handle);
        }

        // Wait for all tasks (they run indefinitely)
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Run the health check loop for a single provider.
async fn run_health_check_loop(
    name: String,
    provider: Arc<dyn Provider>,
    config: ProviderHealthCheckConfig,
    registry: ProviderHealthStateRegistry,
    event_bus: Option<Arc<EventBus>>,
    client: reqwest::Client,
    circuit_breakers: CircuitBreakerRegistry,
) {
    let interval = config.interval();

    tracing::debug!(
        provider = %name,
        interval_secs = config.interval_secs,
        "Starting health check loop"
    );

    // Run initial check immediately
    run_single_health_check(
        &name,
        &provider,
        &config,
        &registry,
        &event_bus,
        &client,
        &circuit_breakers,
    )
    .await;

    // Then check at configured interval
    loop {
        tokio::time::sleep(interval).await;
        run_single_health_check(
            &name,
            &provider,
            &config,
            &registry,
            &event_bus,
            &client,
            &circuit_breakers,
        )
        .await;
    }
}

/// Run a single health check and update state.
///
/// # Circuit Breaker Integration
///
/// Health check results are fed into the circuit breaker:
/// - **Failures**: Always recorded (provider is definitely down)
/// - **Successes with Inference mode**: Recorded (proves the model works)
/// - **Successes with Reachability mode**: NOT recorded (API up â‰  model works)
///
/// This asymmetry prevents a simple `/v1/models` check from closing a circuit
/// that was opened due to actual inference failures.
async fn run_single_health_check(
    name: &str,
    provider: &Arc<dyn Provider>,
    config: &ProviderHealthCheckConfig,
    registry: &ProviderHealthStateRegistry,
    event_bus: &Option<Arc<EventBus>>,
    client: &reqwest::Client,
    circuit_breakers: &CircuitBreakerRegistry,
) {
    let start = Instant::now();

    // Apply timeout to the health check
    let timeout = config.timeout();
    let result = match tokio::time::timeout(timeout, provider.health_check(client, config)).await {
        Ok(result) => result,
        Err(_) => {
            // Timeout occurred
            HealthCheckResult::unhealthy(
                start.elapsed().as_millis() as u64,
                format!("Health check timed out after {}s", config.timeout_secs),
                None,
            )
        }
    };

    // Update state and check if status changed
    let status_changed = registry.update_provider(name, &result);

    // Record result to circuit breaker
    if let Some(circuit_breaker) = circuit_breakers.get(name) {
        match result.status {
            HealthStatus::Unhealthy => {
                // Always record failures - provider is definitely down
                circuit_breaker.record_failure();
                tracing::debug!(
                    provider = %name,
                    "Health check failure recorded to circuit breaker"
                );
            }
            HealthStatus::Healthy => {
                // Only record successes for Inference mode - proves the model works
                // Reachability mode (just checking /v1/models) shouldn't close a circuit
                // that was opened due to inference failures
                if config.mode == ProviderHealthCheckMode::Inference {
                    circuit_breaker.record_success();
                    tracing::debug!(
                        provider = %name,
                        "Health check success (inference) recorded to circuit breaker"
                    );
                }
            }
            HealthStatus::Unknown => {
                // Don't record unknown status to circuit breaker
            }
        }
    }

    // Log based on result
    match result.status {
        HealthStatus::Healthy => {
            tracing::debug!(
                provider = %name,
                latency_ms = result.latency_ms,
                status_code = ?result.status_code,
                "Provider health check passed"
            );
        }
        HealthStatus::Unhealthy => {
            tracing::warn!(
                provider = %name,
                latency_ms = result.latency_ms,
                error = ?result.error,
                status_code = ?result.status_code,
                "Provider health check failed"
            );
        }
        HealthStatus::Unknown => {
            tracing::debug!(
                provider = %name,
                "Provider health check returned unknown status"
            );
        }
    }

    // Publish event if status changed
    if status_changed && let Some(bus) = event_bus {
        bus.publish(ServerEvent::ProviderHealthChanged {
            provider: name.to_string(),
            timestamp: Utc::now(),
            is_healthy: result.status == HealthStatus::Healthy,
            latency_ms: Some(result.latency_ms),
            error_message: result.error,
        });
    }
}
