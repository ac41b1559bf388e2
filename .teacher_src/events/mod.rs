//! Event broadcasting system for real-time notifications via WebSocket.
//!
//! This module provides an event bus that allows services to publish events
//! that can be consumed by WebSocket subscribers for real-time monitoring.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Services      │────>│    EventBus     │────>│   WebSocket     │
//! │ (audit, usage)  │     │  (broadcast)    │     │   Handlers      │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! // Publishing an event
//! event_bus.publish(ServerEvent::AuditLogCreated { ... });
//!
//! // Subscribing to events
//! let mut rx = event_bus.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     // Handle event
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default channel capacity for the event bus.
/// This determines how many events can be buffered before slow receivers
/// start missing events (lagging).
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    /// Audit log events (create, access, modify, delete operations)
    Audit,
    /// Usage tracking events (token counts, costs)
    Usage,
    /// Provider health events (circuit breaker state changes)
    Health,
    /// Budget events (threshold warnings, exceeded)
    Budget,
    /// Rate limiting events (warnings, exceeded)
    RateLimit,
    /// All events (wildcard subscription)
    All,
}

impl EventTopic {
    /// Check if this topic matches another topic.
    /// `All` matches everything, otherwise exact match is required.
    pub fn matches(&self, other: &EventTopic) -> bool {
        matches!(self, EventTopic::All) || matches!(other, EventTopic::All) || self == other
    }
}

/// Server events that can be broadcast to WebSocket subscribers.
///
/// Uses `event_type` as the discriminator tag to avoid collision with
/// `ServerMessage::Event` which uses `type: "event"`. This produces JSON like:
/// ```json
/// { "type": "event", "topic": "usage", "event_type": "usage_recorded", ... }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new audit log entry was created.
    AuditLogCreated {
        id: Uuid,
        timestamp: DateTime<Utc>,
        action: String,
        resource_type: String,
        resource_id: Option<String>,
        actor_type: String,
        actor_id: Option<Uuid>,
        org_id: Option<Uuid>,
        project_id: Option<Uuid>,
    },

    /// Usage was recorded for a request.
    UsageRecorded {
        request_id: Uuid,
        timestamp: DateTime<Utc>,
        model: String,
        provider: String,
        input_tokens: i32,
        output_tokens: i32,
        cost_microcents: Option<i64>,
        user_id: Option<Uuid>,
        org_id: Option<Uuid>,
        project_id: Option<Uuid>,
        team_id: Option<Uuid>,
        service_account_id: Option<Uuid>,
    },

    /// A provider's circuit breaker state changed.
    CircuitBreakerStateChanged {
        provider: String,
        timestamp: DateTime<Utc>,
        previous_state: CircuitBreakerState,
        new_state: CircuitBreakerState,
        failure_count: u32,
        success_count: u32,
    },

    /// A budget threshold was reached.
    BudgetThresholdReached {
        timestamp: DateTime<Utc>,
        budget_type: BudgetType,
        threshold_percent: u8,
        current_amount_microcents: i64,
        limit_microcents: i64,
        user_id: Option<Uuid>,
        org_id: Option<Uuid>,
        project_id: Option<Uuid>,
    },

    /// Rate limit warning or exceeded.
    RateLimitWarning {
        timestamp: DateTime<Utc>,
        limit_type: RateLimitType,
        current_count: u64,
        limit: u64,
        window_secs: u64,
        user_id: Option<Uuid>,
        api_key_id: Option<Uuid>,
    },

    /// Provider health status changed.
    ProviderHealthChanged {
        provider: String,
        timestamp: DateTime<Utc>,
        is_healthy: bool,
        latency_ms: Option<u64>,
        error_message: Option<String>,
    },
}

impl ServerEvent {
    /// Get the topic for this event.
    pub fn topic(&self) -> EventTopic {
        match self {
            ServerEvent::AuditLogCreated { .. } => EventTopic::Audit,
            ServerEvent::UsageRecorded { .. } => EventTopic::Usage,
            ServerEvent::CircuitBreakerStateChanged { .. } => EventTopic::Health,
            ServerEvent::BudgetThresholdReached { .. } => EventTopic::Budget,
            ServerEvent::RateLimitWarning { .. } => EventTopic::RateLimit,
            ServerEvent::ProviderHealthChanged { .. } => EventTopic::Health,
        }
    }

    /// Get the event type name as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::AuditLogCreated { .. } => "audit_log_created",
            ServerEvent::UsageRecorded { .. } => "usage_recorded",
            ServerEvent::CircuitBreakerStateChanged { .. } => "circuit_breaker_state_changed",
            ServerEvent::BudgetThresholdReached { .. } => "budget_threshold_reached",
            ServerEvent::RateLimitWarning { .. } => "rate_limit_warning",
            ServerEvent::ProviderHealthChanged { .. } => "provider_health_changed",
        }
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, testing if service recovered
    HalfOpen,
}

/// Budget types for threshold events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetType {
    /// Daily budget limit
    Daily,
    /// Monthly budget limit
    Monthly,
    /// Per-request budget limit
    PerRequest,
}

/// Rate limit types for warning events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitType {
    /// Requests per minute
    RequestsPerMinute,
    /// Requests per hour
    RequestsPerHour,
    /// Tokens per minute
    TokensPerMinute,
    /// Concurrent requests
    Concurrent,
}

/// Central event bus for broadcasting server events.
///
/// Uses a tokio broadcast channel to allow multiple subscribers to receive
/// the same events. Events are cloned for each subscriber.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
    /// Counter for total events published (for metrics)
    events_published: AtomicU64,
    /// Counter for events dropped due to no subscribers
    events_dropped: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is dropped and 0 is returned.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                // No active subscribers, event is dropped
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Subscribe to events from this bus.
    ///
    /// Returns a receiver that can be used to receive events.
    /// If the receiver falls behind, it will receive `RecvError::Lagged`
    /// indicating how many events were missed.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of events published.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Get the number of events dropped (no subscribers).
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        // Clone shares the same underlying broadcast channel
        Self {
            sender: self.sender.clone(),
            events_published: AtomicU64::new(self.events_published.load(Ordering::Relaxed)),
            events_dropped: AtomicU64::new(self.events_dropped.load(Ordering::Relaxed)),
        }
    }
}
