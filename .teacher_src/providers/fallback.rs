//! Provider fallback logic for handling failures with alternative providers.
//!
//! This module provides error classification to determine whether a failed request
//! should be retried with a fallback provider or returned immediately.
//!
//! # Fallback Strategy
//!
//! 1. Try primary model on primary provider
//! 2. On retryable failure, try model-specific fallbacks in order (if configured)
//! 3. If all model fallbacks fail (or none configured), try provider-level fallbacks
//! 4. Each provider fallback uses the originally requested model (with its own model fallbacks)
//!
//! # Error Classification
//!
//! **Retryable errors** (should try fallback):
//! - Circuit breaker open
//! - 5xx server errors (500, 502, 503, 504)
//! - Connection errors (network unreachable, connection refused)
//! - Timeouts
//!
//! **Non-retryable errors** (return immediately):
//! - 4xx client errors (bad request, validation errors)
//! - 401 Unauthorized / 403 Forbidden (authentication/authorization failures)
//! - 429 Too Many Requests (rate limiting is provider-specific, not our issue)
//! - Successful responses (even with unexpected content)

use http::StatusCode;

use super::ProviderError;

/// Result of classifying an error for fallback purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Error is retryable - try next fallback provider/model.
    Retry,
    /// Error is not retryable - return immediately to client.
    NoRetry,
}

/// Classifies a `ProviderError` to determine if fallback should be attempted.
///
/// # Arguments
///
/// * `error` - The provider error to classify
///
/// # Returns
///
/// * `FallbackDecision::Retry` - The error is transient and fallback should be tried
/// * `FallbackDecision::NoRetry` - The error is permanent and should be returned to client
pub fn classify_provider_error(error: &ProviderError) -> FallbackDecision {
    match error {
        // Circuit breaker open - definitely retry with fallback
        ProviderError::CircuitBreakerOpen(_) => FallbackDecision::Retry,

        // HTTP request errors - check the underlying cause
        ProviderError::Request(reqwest_err) => classify_reqwest_error(reqwest_err),

        // Response builder errors are internal issues - retry might help if it's a transient issue
        ProviderError::ResponseBuilder(_) => FallbackDecision::Retry,

        // Internal errors are typically programming errors - don't retry
        ProviderError::Internal(_) => FallbackDecision::NoRetry,
    }
}

/// Classifies a `reqwest::Error` for fallback purposes.
fn classify_reqwest_error(error: &reqwest::Error) -> FallbackDecision {
    // Connection errors are retryable - different provider might be reachable
    if error.is_connect() {
        return FallbackDecision::Retry;
    }

    // Timeouts are retryable - different provider might respond faster
    if error.is_timeout() {
        return FallbackDecision::Retry;
    }

    // Request errors (failed to build/send) might be transient
    if error.is_request() {
        return FallbackDecision::Retry;
    }

    // Body errors during streaming might be transient network issues
    if error.is_body() {
        return FallbackDecision::Retry;
    }

    // If we got an HTTP status, classify based on the status code
    if let Some(status) = error.status() {
        return classify_http_status(status);
    }

    // Unknown error type - be conservative and retry
    FallbackDecision::Retry
}

/// Classifies an HTTP status code from a provider response for fallback purposes.
///
/// This is used both for reqwest errors with status codes and for successful
/// HTTP responses that contain error status codes (the provider returned an error).
///
/// # Arguments
///
/// * `status` - The HTTP status code
///
/// # Returns
///
/// * `FallbackDecision::Retry` - Server errors (5xx) should trigger fallback
/// * `FallbackDecision::NoRetry` - Client errors (4xx) should not trigger fallback
pub fn classify_http_status(status: StatusCode) -> FallbackDecision {
    // 5xx server errors are retryable - the provider is having issues
    if status.is_server_error() {
        return FallbackDecision::Retry;
    }

    // 4xx client errors are generally not retryable - the request is bad
    // and sending it to a different provider won't help
    if status.is_client_error() {
        return FallbackDecision::NoRetry;
    }

    // 2xx success - no fallback needed
    if status.is_success() {
        return FallbackDecision::NoRetry;
    }

    // 3xx redirects - shouldn't happen with API calls, but don't retry
    if status.is_redirection() {
        return FallbackDecision::NoRetry;
    }

    // 1xx informational - shouldn't happen, don't retry
    FallbackDecision::NoRetry
}

/// Checks if a response indicates an error that should trigger fallback.
///
/// This examines the HTTP status code of a successful HTTP response
/// (i.e., we got a response from the provider, but it might be an error response).
///
/// # Arguments
///
/// * `status` - The HTTP status code from the provider response
///
/// # Returns
///
/// * `true` - The response status indicates a retryable error
/// * `false` - The response is successful or has a non-retryable error
#[allow(dead_code)] // Useful for checking response status in future enhancements
pub fn should_fallback_on_response_status(status: StatusCode) -> bool {
    classify_http_status(status) == FallbackDecision::Retry
}

/// A target for fallback: a provider name and model name.
#[derive(Debug, Clone)]
pub struct FallbackTarget {
    /// Name of the provider to use.
    pub provider_name: String,
    /// Model name to use with this provider.
    pub model_name: String,
}

/// Builds the fallback chain for a request.
///
/// The chain is built in this order:
/// 1. Model-specific fallbacks (if any) - tried first
/// 2. Provider-level fallbacks - tried after model fallbacks are exhausted
///
/// # Arguments
///
/// * `primary_provider_name` - Name of the primary provider
/// * `primary_model_name` - Name of the model being requested
/// * `providers_config` - All provider configurations
///
/// # Returns
///
/// A vector of fallback targets to try in order. Does NOT include the primary provider.
pub fn build_fallback_chain(
    primary_provider_name: &str,
    primary_model_name: &str,
    providers_config: &crate::config::ProvidersConfig,
) -> Vec<FallbackTarget> {
    let mut chain = Vec::new();

    // Get the primary provider config
    let Some(primary_config) = providers_config.get(primary_provider_name) else {
        return chain;
    };

    // 1. Add model-specific fallbacks first
    if let Some(model_fallbacks) = primary_config.get_model_fallbacks(primary_model_name) {
        for fallback in model_fallbacks {
            let target_provider = fallback
                .provider
                .as_deref()
                .unwrap_or(primary_provider_name);

            // Skip if fallback provider doesn't exist
            if providers_config.get(target_provider).is_none() {
                tracing::warn!(
                    provider = target_provider,
                    model = %fallback.model,
                    "Skipping model fallback: provider not found"
                );
                continue;
            }

            chain.push(FallbackTarget {
                provider_name: target_provider.to_string(),
                model_name: fallback.model.clone(),
            });
        }
    }

    // 2. Add provider-level fallbacks
    for fallback_provider_name in primary_config.fallback_providers() {
        // Skip if fallback provider doesn't exist
        if providers_config.get(fallback_provider_name).is_none() {
            tracing::warn!(
                provider = fallback_provider_name,
                "Skipping provider fallback: provider not found"
            );
            continue;
        }

        chain.push(FallbackTarget {
            provider_name: fallback_provider_name.clone(),
            // Use the original model name for provider fallbacks
            model_name: primary_model_name.to_string(),
        });
    }

    chain
}
