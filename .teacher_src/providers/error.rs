//! Unified provider error handling.
//!
//! This module provides a consistent way to translate provider-specific errors
//! into OpenAI-compatible error responses. All providers should use these types
//! and functions to ensure consistent error handling across the gateway.

use axum::{body::Body, response::Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible error types.
///
/// These map to the `type` field in OpenAI's error response format.
/// See: https://platform.openai.com/docs/guides/error-codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiErrorType {
    /// Invalid parameters, malformed request, model not found, validation errors.
    InvalidRequest,
    /// Invalid API key, unauthorized access, permission denied.
    Authentication,
    /// Rate limit exceeded, quota exceeded, too many requests.
    RateLimit,
    /// Internal server error, timeout, service unavailable.
    Server,
    /// Catch-all for other provider-specific errors.
    Api,
}

impl OpenAiErrorType {
    /// Returns the OpenAI error type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request_error",
            Self::Authentication => "authentication_error",
            Self::RateLimit => "rate_limit_error",
            Self::Server => "server_error",
            Self::Api => "api_error",
        }
    }
}

impl std::fmt::Display for OpenAiErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider error information extracted from a provider's error response.
#[derive(Debug, Clone)]
pub struct ProviderErrorInfo {
    /// The OpenAI-compatible error type.
    pub error_type: OpenAiErrorType,
    /// Human-readable error message.
    pub message: String,
    /// Provider-specific error code (will be lowercased in response).
    pub code: String,
}

impl ProviderErrorInfo {
    /// Create a new provider error info.
    pub fn new(
        error_type: OpenAiErrorType,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create an invalid request error.
    #[cfg(test)]
    pub fn invalid_request(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(OpenAiErrorType::InvalidRequest, message, code)
    }

    /// Create an authentication error.
    #[cfg(test)]
    pub fn authentication(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(OpenAiErrorType::Authentication, message, code)
    }

    /// Create a rate limit error.
    #[cfg(test)]
    pub fn rate_limit(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(OpenAiErrorType::RateLimit, message, code)
    }

    /// Create a server error.
    #[cfg(test)]
    pub fn server(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(OpenAiErrorType::Server, message, code)
    }

    /// Create a generic API error.
    #[cfg(test)]
    pub fn api(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(OpenAiErrorType::Api, message, code)
    }
}

/// OpenAI-compatible error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiErrorResponse {
    pub error: OpenAiErrorBody,
}

/// OpenAI-compatible error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

/// Build an OpenAI-compatible error response from provider error info.
///
/// This function creates a consistent error response format that matches
/// OpenAI's error schema across all providers.
pub fn build_provider_error_response(
    status: StatusCode,
    error_info: ProviderErrorInfo,
) -> Result<Response, super::ProviderError> {
    let response_body = OpenAiErrorResponse {
        error: OpenAiErrorBody {
            message: error_info.message,
            error_type: error_info.error_type.as_str().to_string(),
            code: error_info.code.to_lowercase(),
        },
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_string(&response_body).unwrap_or_default(),
        ))?)
}

/// Trait for parsing provider-specific error responses.
///
/// Implement this trait for each provider to extract error information
/// from their specific error format.
pub trait ProviderErrorParser {
    /// Parse a provider's error response and extract error information.
    ///
    /// # Arguments
    /// * `status` - The HTTP status code from the provider
    /// * `headers` - Response headers (some providers include error info in headers)
    /// * `body` - The response body bytes
    ///
    /// # Returns
    /// Provider error information suitable for building an OpenAI-compatible response.
    fn parse_error(status: StatusCode, headers: &http::HeaderMap, body: &[u8])
    -> ProviderErrorInfo;
}

#[cfg(feature = "provider-bedrock")]
/// AWS Bedrock error parser.
///
/// Bedrock uses the `x-amzn-errortype` header and a simple `{"message": "..."}` body.
pub struct BedrockErrorParser;

#[cfg(feature = "provider-bedrock")]
impl ProviderErrorParser for BedrockErrorParser {
    fn parse_error(
        _status: StatusCode,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> ProviderErrorInfo {
        // Extract error type from x-amzn-errortype header (e.g., "ValidationException:http://...")
        let error_type_header = headers
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(':').next().unwrap_or(s))
            .unwrap_or("bedrock_error");

        // Map AWS error types to OpenAI error types
        let error_type = match error_type_header {
            "ValidationException" => OpenAiErrorType::InvalidRequest,
            "AccessDeniedException" | "UnrecognizedClientException" => {
                OpenAiErrorType::Authentication
            }
            "ThrottlingException" | "ServiceQuotaExceededException" => OpenAiErrorType::RateLimit,
            "ModelNotReadyException" | "ModelTimeoutException" => OpenAiErrorType::Server,
            "InternalServerException" | "ServiceUnavailableException" => OpenAiErrorType::Server,
            "ResourceNotFoundException" | "ModelNotFoundException" => {
                OpenAiErrorType::InvalidRequest
            }
            _ => OpenAiErrorType::Api,
        };

        // Parse the Bedrock error body
        let bedrock_error: serde_json::Value =
            serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));

        let message = bedrock_error["message"]
            .as_str()
            .unwrap_or("Unknown Bedrock error")
            .to_string();

        ProviderErrorInfo::new(error_type, message, error_type_header)
    }
}

#[cfg(feature = "provider-vertex")]
/// Google Vertex AI / Gemini error parser.
///
/// Vertex uses a JSON body with `{"error": {"status": "...", "message": "..."}}`.
pub struct VertexErrorParser;

#[cfg(feature = "provider-vertex")]
impl ProviderErrorParser for VertexErrorParser {
    fn parse_error(
        _status: StatusCode,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> ProviderErrorInfo {
        // Parse the Vertex error body
        let vertex_error: serde_json::Value =
            serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));

        let error_obj = &vertex_error["error"];
        let vertex_status = error_obj["status"].as_str().unwrap_or("UNKNOWN");
        let message = error_obj["message"]
            .as_str()
            .unwrap_or("Unknown Vertex AI error")
            .to_string();

        // Map Vertex status to OpenAI error type
        let error_type = match vertex_status {
            "NOT_FOUND" => OpenAiErrorType::InvalidRequest,
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => OpenAiErrorType::InvalidRequest,
            "UNAUTHENTICATED" | "PERMISSION_DENIED" => OpenAiErrorType::Authentication,
            "RESOURCE_EXHAUSTED" => OpenAiErrorType::RateLimit,
            "INTERNAL" | "UNAVAILABLE" | "DEADLINE_EXCEEDED" => OpenAiErrorType::Server,
            _ => OpenAiErrorType::Api,
        };

        ProviderErrorInfo::new(error_type, message, vertex_status)
    }
}

/// Anthropic error parser.
///
/// Anthropic uses a JSON body with `{"type": "error", "error": {"type": "...", "message": "..."}}`.
pub struct AnthropicErrorParser;

impl ProviderErrorParser for AnthropicErrorParser {
    fn parse_error(
        _status: StatusCode,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> ProviderErrorInfo {
        // Parse the Anthropic error body
        let anthropic_error: serde_json::Value =
            serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));

        let error_obj = &anthropic_error["error"];
        let anthropic_type = error_obj["type"].as_str().unwrap_or("api_error");
        let message = error_obj["message"]
            .as_str()
            .unwrap_or("Unknown Anthropic error")
            .to_string();

        // Map Anthropic error types to OpenAI error types
        // See: https://docs.anthropic.com/en/api/errors
        let error_type = match anthropic_type {
            "invalid_request_error" => OpenAiErrorType::InvalidRequest,
            "authentication_error" => OpenAiErrorType::Authentication,
            "permission_error" => OpenAiErrorType::Authentication,
            "not_found_error" => OpenAiErrorType::InvalidRequest,
            "rate_limit_error" => OpenAiErrorType::RateLimit,
            "overloaded_error" => OpenAiErrorType::Server,
            "api_error" => OpenAiErrorType::Server,
            _ => OpenAiErrorType::Api,
        };

        ProviderErrorInfo::new(error_type, message, anthropic_type)
    }
}

#[cfg(feature = "provider-azure")]
/// Azure OpenAI error parser.
///
/// Azure OpenAI uses the same format as OpenAI: `{"error": {"message": "...", "type": "...", "code": "..."}}`.
pub struct AzureOpenAiErrorParser;

#[cfg(feature = "provider-azure")]
impl ProviderErrorParser for AzureOpenAiErrorParser {
    fn parse_error(
        status: StatusCode,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> ProviderErrorInfo {
        // Parse the Azure OpenAI error body (same format as OpenAI)
        let azure_error: serde_json::Value =
            serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));

        let error_obj = &azure_error["error"];
        let azure_type = error_obj["type"].as_str();
        let azure_code = error_obj["code"].as_str().unwrap_or("unknown");
        let message = error_obj["message"]
            .as_str()
            .unwrap_or("Unknown Azure OpenAI error")
            .to_string();

        // Azure may include type from OpenAI format, or we infer from status/code
        let error_type = if let Some(t) = azure_type {
            match t {
                "invalid_request_error" => OpenAiErrorType::InvalidRequest,
                "authentication_error" => OpenAiErrorType::Authentication,
                "rate_limit_error" => OpenAiErrorType::RateLimit,
                "server_error" => OpenAiErrorType::Server,
                _ => OpenAiErrorType::Api,
            }
        } else {
            // Infer from status code if type not present
            match status.as_u16() {
                400 | 404 | 422 => OpenAiErrorType::InvalidRequest,
                401 | 403 => OpenAiErrorType::Authentication,
                429 => OpenAiErrorType::RateLimit,
                500..=599 => OpenAiErrorType::Server,
                _ => OpenAiErrorType::Api,
            }
        };

        ProviderErrorInfo::new(error_type, message, azure_code)
    }
}
