//! Azure AI Content Safety provider for guardrails.
//!
//! This provider uses Azure AI Content Safety's Text Analysis API to detect harmful content
//! across categories including Hate, Violence, SelfHarm, and Sexual content.
//!
//! # Example Configuration
//!
//! ```toml
//! [features.guardrails.input.provider]
//! type = "azure_content_safety"
//! endpoint = "https://myservice.cognitiveservices.azure.com"
//! api_key = "${AZURE_CONTENT_SAFETY_KEY}"
//! api_version = "2024-09-01"  # Optional, defaults to 2024-09-01
//!
//! [features.guardrails.input.provider.thresholds]
//! Hate = 2      # Block severity 2 and above (0-6 scale)
//! Violence = 4  # Block severity 4 and above
//! ```
//!
//! # Azure Content Safety Categories
//!
//! Azure returns severity scores (0-6) for each category:
//! - **Hate**: Content expressing hatred or discrimination
//! - **Violence**: Content describing physical violence
//! - **SelfHarm**: Content related to self-harm
//! - **Sexual**: Sexually explicit content
//!
//! Default thresholds block severity 2+ for all categories.

use std::{collections::HashMap, time::Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{
    Category, GuardrailsError, GuardrailsProvider, GuardrailsRequest, GuardrailsResponse,
    GuardrailsResult, Severity, Violation, inject_trace_context,
};

/// Default Azure Content Safety API version.
#[allow(dead_code)] // Guardrail infrastructure
const DEFAULT_API_VERSION: &str = "2024-09-01";

/// Default severity threshold for flagging content (0-6 scale).
const DEFAULT_SEVERITY_THRESHOLD: u8 = 2;

/// Azure AI Content Safety provider.
///
/// Uses Azure's Text Analysis API to evaluate content for policy violations.
/// Supports configurable severity thresholds per category and blocklist checking.
pub struct AzureContentSafetyProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    /// Per-category severity thresholds (0-6). Content at or above threshold is flagged.
    thresholds: HashMap<String, u8>,
    /// Blocklist names to check against.
    blocklist_names: Vec<String>,
}

impl AzureContentSafetyProvider {
    /// Creates a new Azure Content Safety provider.
    ///
    /// # Arguments
    /// * `client` - HTTP client to use for requests
    /// * `endpoint` - Azure Content Safety endpoint URL
    /// * `api_key` - Azure API key
    /// * `api_version` - API version (e.g., "2024-09-01")
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            thresholds: HashMap::new(),
            blocklist_names: Vec::new(),
        }
    }

    /// Sets custom severity thresholds for categories.
    ///
    /// Content with severity at or above the threshold will be flagged as a violation.
    /// Default threshold is 2 for all categories.
    pub fn with_thresholds(mut self, thresholds: HashMap<String, u8>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sets blocklist names to check against.
    pub fn with_blocklists(mut self, blocklist_names: Vec<String>) -> Self {
        self.blocklist_names = blocklist_names;
        self
    }

    /// Creates provider from configuration.
    #[allow(dead_code)] // Guardrail infrastructure
    pub fn from_config(
        client: Client,
        endpoint: String,
        api_key: String,
        api_version: Option<String>,
        thresholds: HashMap<String, u8>,
        blocklist_names: Vec<String>,
    ) -> GuardrailsResult<Self> {
        if endpoint.is_empty() {
            return Err(GuardrailsError::config_error(
                "Azure Content Safety requires an endpoint URL",
            ));
        }

        if api_key.is_empty() {
            return Err(GuardrailsError::config_error(
                "Azure Content Safety requires an API key",
            ));
        }

        let api_version = api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        Ok(Self::new(client, endpoint, api_key, api_version)
            .with_thresholds(thresholds)
            .with_blocklists(blocklist_names))
    }

    /// Gets the threshold for a category, returning the default if not configured.
    fn get_threshold(&self, category: &str) -> u8 {
        self.thresholds
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_SEVERITY_THRESHOLD)
    }

    /// Extracts violations from Azure Content Safety response.
    fn extract_violations(&self, response: &TextAnalysisResponse) -> Vec<Violation> {
        let mut violations = Vec::new();

        // Check standard categories
        if let Some(ref result) = response.categories_analysis {
            for analysis in result {
                let threshold = self.get_threshold(&analysis.category);
                let severity = analysis.severity.unwrap_or(0);

                if severity >= threshold {
                    let category = map_azure_category(&analysis.category);
                    let normalized_severity = Severity::from_azure_threshold(severity);

                    violations.push(
                        Violation::new(category, normalized_severity, severity_to_score(severity))
                            .with_message(format!(
                                "Content flagged for {} (severity: {})",
                                analysis.category, severity
                            ))
                            .with_details(serde_json::json!({
                                "category": analysis.category,
                                "severity": severity,
                                "threshold": threshold,
                            })),
                    );
                }
            }
        }

        // Check blocklist matches
        if let Some(ref blocklist_match) = response.blocklists_match {
            for item in blocklist_match {
                violations.push(
                    Violation::new(
                        Category::Custom(format!("blocklist:{}", item.blocklist_name)),
                        Severity::High,
                        1.0,
                    )
                    .with_message(format!(
                        "Blocklist match: {} in {}",
                        item.blocklist_item_text, item.blocklist_name
                    ))
                    .with_details(serde_json::json!({
                        "blocklist_name": item.blocklist_name,
                        "blocklist_item_id": item.blocklist_item_id,
                        "blocklist_item_text": item.blocklist_item_text,
                    })),
                );
            }
        }

        violations
    }
}

#[async_trait]
impl GuardrailsProvider for AzureContentSafetyProvider {
    fn name(&self) -> &str {
        "azure_content_safety"
    }

    #[instrument(
        skip(self, request),
        fields(
            provider = "azure_content_safety",
            endpoint = %self.endpoint,
            text_length = request.text.len()
        )
    )]
    async fn evaluate(&self, request: &GuardrailsRequest) -> GuardrailsResult<GuardrailsResponse> {
        let start = Instant::now();

        // Build the request body
        let mut api_request = TextAnalysisRequest {
            text: request.text.clone(),
            categories: None,      // Use default categories
            blocklist_names: None, // Set below if configured
            halt_on_blocklist_hit: None,
            output_type: Some("FourSeverityLevels".to_string()),
        };

        // Add blocklist names if configured
        if !self.blocklist_names.is_empty() {
            api_request.blocklist_names = Some(self.blocklist_names.clone());
            api_request.halt_on_blocklist_hit = Some(false); // Continue analysis after blocklist hit
        }

        let url = format!(
            "{}/contentsafety/text:analyze?api-version={}",
            self.endpoint, self.api_version
        );

        // Inject trace context for distributed tracing
        let mut trace_headers = HashMap::new();
        inject_trace_context(&mut trace_headers);

        let mut req_builder = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/json");

        for (key, value) in trace_headers {
            req_builder = req_builder.header(key, value);
        }

        let response = req_builder
            .json(&api_request)
            .send()
            .await
            .map_err(|e| GuardrailsError::from_reqwest("azure_content_safety", e))?;

        let status = response.status();

        // Handle error status codes
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GuardrailsError::auth_error(
                "azure_content_safety",
                "Invalid API key or insufficient permissions",
            ));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(GuardrailsError::rate_limited(
                "azure_content_safety",
                retry_after,
            ));
        }

        if status == reqwest::StatusCode::BAD_REQUEST {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GuardrailsError::provider_error(
                "azure_content_safety",
                format!("Invalid request: {}", error_text),
            ));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GuardrailsError::provider_error(
                "azure_content_safety",
                format!("API returned {}: {}", status, error_text),
            ));
        }

        let api_response: TextAnalysisResponse = response.json().await.map_err(|e| {
            GuardrailsError::provider_error(
                "azure_content_safety",
                format!("Failed to parse response: {}", e),
            )
        })?;

        let latency_ms = start.elapsed().as_millis() as u64;

        // Extract violations based on thresholds
        let violations = self.extract_violations(&api_response);

        Ok(GuardrailsResponse::with_violations(violations)
            .with_latency(latency_ms)
            .with_metadata(serde_json::json!({
                "categories_analysis": api_response.categories_analysis,
                "blocklists_match": api_response.blocklists_match,
            })))
    }

    fn supported_categories(&self) -> &[Category] {
        &[
            Category::Hate,
            Category::Violence,
            Category::SelfHarm,
            Category::Sexual,
        ]
    }
}

/// Maps Azure category names to standard Category enum.
fn map_azure_category(azure_category: &str) -> Category {
    match azure_category {
        "Hate" => Category::Hate,
        "Violence" => Category::Violence,
        "SelfHarm" => Category::SelfHarm,
        "Sexual" => Category::Sexual,
        other => Category::Custom(other.to_string()),
    }
}

/// Converts Azure severity (0-6) to a normalized score (0.0-1.0).
fn severity_to_score(severity: u8) -> f64 {
    (severity as f64 / 6.0).min(1.0)
}

// ============================================================================
// Azure Content Safety API Types
// ============================================================================

/// Request body for Azure Text Analysis API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextAnalysisRequest {
    /// The text to analyze.
    text: String,

    /// Categories to analyze (default: all).
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<String>>,

    /// Blocklist names to check.
    #[serde(skip_serializing_if = "Option::is_none")]
    blocklist_names: Option<Vec<String>>,

    /// Whether to halt on blocklist hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    halt_on_blocklist_hit: Option<bool>,

    /// Output type for severity levels.
    /// "FourSeverityLevels" for 0, 2, 4, 6
    /// "EightSeverityLevels" for 0-7
    #[serde(skip_serializing_if = "Option::is_none")]
    output_type: Option<String>,
}

/// Response from Azure Text Analysis API.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextAnalysisResponse {
    /// Analysis results per category.
    #[serde(default)]
    categories_analysis: Option<Vec<CategoryAnalysis>>,

    /// Blocklist match results.
    #[serde(default)]
    blocklists_match: Option<Vec<BlocklistMatch>>,
}

/// Analysis result for a single category.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryAnalysis {
    /// Category name (Hate, Violence, SelfHarm, Sexual).
    category: String,

    /// Severity level (0-6 or 0-7 depending on output_type).
    #[serde(default)]
    severity: Option<u8>,
}

/// Blocklist match result.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlocklistMatch {
    /// Name of the blocklist that matched.
    blocklist_name: String,

    /// ID of the blocklist item that matched.
    blocklist_item_id: String,

    /// Text of the blocklist item that matched.
    blocklist_item_text: String,
}
