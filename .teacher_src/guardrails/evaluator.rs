//! Guardrails evaluator for content filtering.
//!
//! This module provides evaluators for input and output guardrails:
//!
//! - `InputGuardrails`: Evaluates user input before sending to the LLM
//! - `OutputGuardrails`: Evaluates LLM responses before returning to the user
//!
//! Both evaluators share common infrastructure:
//! - Creating guardrails providers from configuration
//! - Extracting text content from requests/responses
//! - Evaluating content against guardrails policies
//! - Applying configured actions (block, warn, log, redact)

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use tracing::instrument;

#[cfg(feature = "provider-bedrock")]
use super::BedrockGuardrailsProvider;
use super::{
    ActionExecutor, AzureContentSafetyProvider, BlocklistProvider, CustomHttpProvider,
    GuardrailsError, GuardrailsProvider, GuardrailsRequest, GuardrailsResponse,
    GuardrailsRetryConfig, OpenAIModerationProvider, ResolvedAction, Violation,
};
use crate::{
    api_types::{
        CreateChatCompletionPayload, Message, MessageContent,
        chat_completion::ContentPart,
        completions::{CompletionPrompt, CreateCompletionPayload},
        responses::{
            CreateResponsesPayload, EasyInputMessage, EasyInputMessageContent,
            OutputMessageContentItem, ResponseInputContentItem, ResponsesInput, ResponsesInputItem,
        },
    },
    config::{
        GuardrailsConfig, GuardrailsProvider as GuardrailsProviderConfig, InputGuardrailsConfig,
        OutputGuardrailsConfig,
    },
    observability::metrics::{
        record_guardrails_concurrent_race, record_guardrails_error, record_guardrails_evaluation,
        record_guardrails_timeout, record_guardrails_violation,
    },
};

/// Input guardrails evaluator.
///
/// Evaluates user input content against guardrails policies before sending to the LLM.
/// Supports two execution modes:
/// - **Blocking**: Wait for guardrails evaluation to complete before calling the LLM
/// - **Concurrent**: Start guardrails and LLM calls simultaneously, canceling if guardrails fail
pub struct InputGuardrails {
    /// The guardrails provider to use for evaluation.
    provider: Arc<dyn GuardrailsProvider>,
    /// Action executor for applying configured actions.
    action_executor: ActionExecutor,
    /// Retry configuration.
    retry_config: GuardrailsRetryConfig,
    /// Timeout for evaluation.
    timeout: Duration,
    /// Execution mode (blocking or concurrent).
    mode: crate::config::GuardrailsExecutionMode,
    /// Action to take on timeout (for concurrent mode).
    on_timeout: crate::config::GuardrailsTimeoutAction,
    /// Action to take on provider error.
    on_error: crate::config::GuardrailsErrorAction,
}

impl InputGuardrails {
    /// Creates a new input guardrails evaluator from configuration.
    ///
    /// Returns `None` if guardrails are disabled or not configured.
    pub fn from_config(
        config: &GuardrailsConfig,
        http_client: &Client,
    ) -> Result<Option<Self>, GuardrailsError> {
        if !config.enabled {
            return Ok(None);
        }

        let Some(input_config) = &config.input else {
            return Ok(None);
        };

        if !input_config.enabled {
            return Ok(None);
        }

        let provider = create_provider(&input_config.provider, http_client)?;
        let action_executor = ActionExecutor::from_input_config(input_config);
        let retry_config = GuardrailsRetryConfig::default();

        Ok(Some(Self {
            provider,
            action_executor,
            retry_config,
            timeout: Duration::from_millis(input_config.timeout_ms),
            mode: input_config.mode.clone(),
            on_timeout: input_config.on_timeout.clone(),
            on_error: input_config.on_error.clone(),
        }))
    }

    /// Creates input guardrails from a specific input config (for testing).
    pub fn from_input_config(
        config: &InputGuardrailsConfig,
        http_client: &Client,
    ) -> Result<Self, GuardrailsError> {
        let provider = create_provider(&config.provider, http_client)?;
        let action_executor = ActionExecutor::from_input_config(config);
        let retry_config = GuardrailsRetryConfig::default();

        Ok(Self {
            provider,
            action_executor,
            retry_config,
            timeout: Duration::from_millis(config.timeout_ms),
            mode: config.mode.clone(),
            on_timeout: config.on_timeout.clone(),
            on_error: config.on_error.clone(),
        })
    }

    /// Evaluates a chat completion payload against guardrails.
    ///
    /// Extracts all text content from messages and evaluates them.
    /// Returns the resolved action to take based on the evaluation result.
    #[instrument(skip(self, payload), fields(provider = %self.provider.name()))]
    pub async fn evaluate_payload(
        &self,
        payload: &CreateChatCompletionPayload,
        request_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<InputGuardrailsResult, GuardrailsError> {
        // Extract all text content from messages
        let text = extract_text_from_messages(&payload.messages);

        if text.is_empty() {
            tracing::debug!("No text content to evaluate");
            return Ok(InputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: text,
            });
        }

        // Build the guardrails request
        let mut request = GuardrailsRequest::user_input(&text);
        if let Some(id) = request_id {
            request = request.with_request_id(id);
        }
        if let Some(id) = user_id {
            request = request.with_user_id(id);
        }

        // Evaluate with timeout
        // Note: Retry is handled internally by individual providers or can be added
        // at a higher level. The with_retry function requires 'static closures which
        // doesn't work well with the async trait pattern.
        let evaluation_result =
            tokio::time::timeout(self.timeout, self.evaluate_with_retry(&request)).await;

        let response = match evaluation_result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // Provider error
                return self.handle_provider_error(e, &text);
            }
            Err(_) => {
                // Timeout
                return self.handle_timeout(&text);
            }
        };

        // Apply configured actions
        let action = self.action_executor.resolve_action(&response, &text);

        tracing::debug!(
            passed = response.passed,
            violations = response.violations.len(),
            action = ?action,
            "Guardrails evaluation complete"
        );

        Ok(InputGuardrailsResult {
            action,
            response,
            evaluated_text: text,
        })
    }

    /// Evaluates a completion payload against guardrails.
    ///
    /// Extracts text content from the prompt and evaluates it.
    /// Returns the resolved action to take based on the evaluation result.
    #[instrument(skip(self, payload), fields(provider = %self.provider.name()))]
    pub async fn evaluate_completion_payload(
        &self,
        payload: &CreateCompletionPayload,
        request_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<InputGuardrailsResult, GuardrailsError> {
        // Extract text content from prompt
        let text = extract_text_from_completion_payload(payload);

        self.evaluate_text(&text, request_id, user_id).await
    }

    /// Evaluates a responses payload against guardrails.
    ///
    /// Extracts text content from the input and instructions, and evaluates them.
    /// Returns the resolved action to take based on the evaluation result.
    #[instrument(skip(self, payload), fields(provider = %self.provider.name()))]
    pub async fn evaluate_responses_payload(
        &self,
        payload: &CreateResponsesPayload,
        request_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<InputGuardrailsResult, GuardrailsError> {
        // Extract text content from input and instructions
        let text = extract_text_from_responses_payload(payload);

        self.evaluate_text(&text, request_id, user_id).await
    }

    /// Evaluates raw text content against guardrails.
    ///
    /// This is the common evaluation logic used by all payload types.
    async fn evaluate_text(
        &self,
        text: &str,
        request_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<InputGuardrailsResult, GuardrailsError> {
        if text.is_empty() {
            tracing::debug!("No text content to evaluate");
            return Ok(InputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: text.to_string(),
            });
        }

        // Build the guardrails request
        let mut request = GuardrailsRequest::user_input(text);
        if let Some(id) = request_id {
            request = request.with_request_id(id);
        }
        if let Some(id) = user_id {
            request = request.with_user_id(id);
        }

        let start = std::time::Instant::now();

        // Evaluate with timeout
        let evaluation_result =
            tokio::time::timeout(self.timeout, self.evaluate_with_retry(&request)).await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let response = match evaluation_result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // Provider error - record error metrics
                record_guardrails_error(self.provider.name(), "input", e.error_type_for_metrics());
                record_guardrails_evaluation(
                    self.provider.name(),
                    "input",
                    "error",
                    latency_ms as f64 / 1000.0,
                );
                return self.handle_provider_error(e, text);
            }
            Err(_) => {
                // Timeout - record timeout metrics
                record_guardrails_timeout(self.provider.name(), "input");
                record_guardrails_evaluation(
                    self.provider.name(),
                    "input",
                    "timeout",
                    latency_ms as f64 / 1000.0,
                );
                return self.handle_timeout(text);
            }
        };

        // Apply configured actions
        let action = self.action_executor.resolve_action(&response, text);
        let result_label = resolved_action_label(&action);

        // Record evaluation metrics
        record_evaluation_metrics(
            self.provider.name(),
            "input",
            result_label,
            Some(latency_ms),
            &response.violations,
        );

        // Record span events for each violation for distributed tracing
        for violation in &response.violations {
            tracing::event!(
                tracing::Level::INFO,
                category = %violation.category,
                severity = %violation.severity,
                confidence = violation.confidence,
                message = violation.message.as_deref().unwrap_or(""),
                "Guardrails violation detected"
            );
        }

        tracing::debug!(
            passed = response.passed,
            violations = response.violations.len(),
            action = ?action,
            "Guardrails evaluation complete"
        );

        Ok(InputGuardrailsResult {
            action,
            response,
            evaluated_text: text.to_string(),
        })
    }

    /// Evaluates the request with retry logic.
    async fn evaluate_with_retry(
        &self,
        request: &GuardrailsRequest,
    ) -> Result<GuardrailsResponse, GuardrailsError> {
        let max_attempts = if self.retry_config.enabled {
            self.retry_config.max_retries + 1
        } else {
            1
        };

        let mut last_error = None;

        for attempt in 0..max_attempts {
            match self.provider.evaluate(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::debug!(
                            provider = self.provider.name(),
                            attempt = attempt + 1,
                            "Guardrails evaluation succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if error.is_retryable() && attempt < max_attempts - 1 {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        tracing::warn!(
                            provider = self.provider.name(),
                            error = %error,
                            attempt = attempt + 1,
                            max_attempts = max_attempts,
                            delay_ms = delay.as_millis(),
                            "Retryable guardrails error, will retry after delay"
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(error);
                        continue;
                    }

                    if attempt > 0 {
                        tracing::warn!(
                            provider = self.provider.name(),
                            error = %error,
                            attempts = attempt + 1,
                            "Guardrails evaluation failed after all retry attempts"
                        );
                    }
                    return Err(error);
                }
            }
        }

        // This should only be reached if max_attempts is 0, which shouldn't happen
        Err(last_error.unwrap_or_else(|| GuardrailsError::internal("No evaluation attempts made")))
    }

    /// Handles a provider error based on configuration.
    fn handle_provider_error(
        &self,
        error: GuardrailsError,
        text: &str,
    ) -> Result<InputGuardrailsResult, GuardrailsError> {
        use crate::config::GuardrailsErrorAction;

        tracing::warn!(
            error = %error,
            on_error = ?self.on_error,
            "Guardrails provider error"
        );

        match self.on_error {
            GuardrailsErrorAction::Block => Err(error),
            GuardrailsErrorAction::Allow => Ok(InputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: text.to_string(),
            }),
            GuardrailsErrorAction::LogAndAllow => {
                tracing::error!(
                    error = %error,
                    "Guardrails provider error - allowing request (log_and_allow)"
                );
                Ok(InputGuardrailsResult {
                    action: ResolvedAction::Allow,
                    response: GuardrailsResponse::passed(),
                    evaluated_text: text.to_string(),
                })
            }
        }
    }

    /// Handles a timeout based on configuration.
    fn handle_timeout(&self, text: &str) -> Result<InputGuardrailsResult, GuardrailsError> {
        use crate::config::GuardrailsTimeoutAction;

        tracing::warn!(
            timeout_ms = %self.timeout.as_millis(),
            on_timeout = ?self.on_timeout,
            "Guardrails evaluation timed out"
        );

        match self.on_timeout {
            GuardrailsTimeoutAction::Block => Err(GuardrailsError::timeout(
                self.provider.name(),
                self.timeout.as_millis() as u64,
            )),
            GuardrailsTimeoutAction::Allow => Ok(InputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: text.to_string(),
            }),
        }
    }

    /// Returns the provider name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Returns true if the guardrails are configured for concurrent execution mode.
    pub fn is_concurrent(&self) -> bool {
        self.mode == crate::config::GuardrailsExecutionMode::Concurrent
    }

    /// Returns the execution mode.
    pub fn mode(&self) -> &crate::config::GuardrailsExecutionMode {
        &self.mode
    }

    /// Returns the timeout duration for concurrent mode.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the on_timeout action for concurrent mode.
    pub fn on_timeout(&self) -> &crate::config::GuardrailsTimeoutAction {
        &self.on_timeout
    }

    /// Creates an InputGuardrails for testing with a mock provider.
    #[cfg(test)]
    pub(crate) fn for_testing(
        provider: Arc<dyn GuardrailsProvider>,
        timeout: Duration,
        on_timeout: crate::config::GuardrailsTimeoutAction,
    ) -> Self {
        Self {
            provider,
            action_executor: ActionExecutor::new(
                std::collections::HashMap::new(),
                crate::config::GuardrailsAction::Block,
            ),
            retry_config: GuardrailsRetryConfig::default(),
            timeout,
            mode: crate::config::GuardrailsExecutionMode::Concurrent,
            on_timeout,
            on_error: crate::config::GuardrailsErrorAction::Block,
        }
    }
}

/// Result of input guardrails evaluation.
#[derive(Debug)]
pub struct InputGuardrailsResult {
    /// The resolved action to take.
    pub action: ResolvedAction,
    /// The raw guardrails response.
    pub response: GuardrailsResponse,
    /// The text that was evaluated.
    pub evaluated_text: String,
}

impl InputGuardrailsResult {
    /// Returns true if the content should be blocked.
    pub fn is_blocked(&self) -> bool {
        self.action.is_blocked()
    }

    /// Returns the violations found during evaluation.
    pub fn violations(&self) -> &[Violation] {
        self.action.violations()
    }

    /// Returns a string label for the action result (for metrics).
    pub fn result_label(&self) -> &'static str {
        resolved_action_label(&self.action)
    }

    /// Creates response headers for the guardrails result.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();

        // Add result header
        let result = match &self.action {
            ResolvedAction::Allow => "passed",
            ResolvedAction::Block { .. } => "blocked",
            ResolvedAction::Warn { .. } => "warned",
            ResolvedAction::Log { .. } => "logged",
            ResolvedAction::Redact { .. } => "redacted",
        };
        headers.push(("X-Guardrails-Input-Result", result.to_string()));

        // Add violations header if any
        if !self.response.violations.is_empty() {
            let violations: Vec<String> = self
                .response
                .violations
                .iter()
                .map(|v| format!("{}:{}", v.category, v.severity))
                .collect();
            headers.push(("X-Guardrails-Violations", violations.join(",")));
        }

        // Add latency header if available
        if let Some(latency_ms) = self.response.latency_ms {
            headers.push(("X-Guardrails-Latency-Ms", latency_ms.to_string()));
        }

        headers
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrent Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Tracks which operation completed first in concurrent mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrentRaceWinner {
    /// Guardrails evaluation completed first.
    Guardrails,
    /// LLM provider call completed first.
    Llm,
    /// Guardrails timed out (LLM result used based on on_timeout config).
    GuardrailsTimedOut,
}

impl std::fmt::Display for ConcurrentRaceWinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guardrails => write!(f, "guardrails_first"),
            Self::Llm => write!(f, "llm_first"),
            Self::GuardrailsTimedOut => write!(f, "guardrails_timed_out"),
        }
    }
}

/// Result of a concurrent guardrails + LLM evaluation.
///
/// In concurrent mode, the guardrails and LLM are started simultaneously:
/// - If guardrails finish first and fail → cancel/discard LLM result, return error
/// - If guardrails finish first and pass → wait for LLM, return LLM result
/// - If LLM finishes first → wait for guardrails, then decide
/// - If guardrails timeout → behavior depends on `on_timeout` config
#[derive(Debug)]
pub struct ConcurrentEvaluationOutcome<T> {
    /// Which operation completed first.
    pub winner: ConcurrentRaceWinner,
    /// The guardrails result (if available).
    pub guardrails_result: Option<InputGuardrailsResult>,
    /// The LLM result (if available and not cancelled).
    pub llm_result: Option<T>,
    /// Whether the request was blocked by guardrails.
    #[allow(dead_code)] // Guardrail response field
    pub blocked: bool,
    /// Guardrails latency in milliseconds (if completed).
    pub guardrails_latency_ms: Option<u64>,
    /// LLM latency in milliseconds (if completed).
    pub llm_latency_ms: Option<u64>,
}

impl<T> ConcurrentEvaluationOutcome<T> {
    /// Creates headers for the concurrent evaluation result.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();

        // Add concurrent mode header
        headers.push(("X-Guardrails-Mode", "concurrent".to_string()));
        headers.push(("X-Guardrails-Race-Winner", self.winner.to_string()));

        // Add guardrails headers if available
        if let Some(ref result) = self.guardrails_result {
            headers.extend(result.to_headers());
        }

        // Add latency headers
        if let Some(latency) = self.guardrails_latency_ms {
            headers.push(("X-Guardrails-Latency-Ms", latency.to_string()));
        }
        if let Some(latency) = self.llm_latency_ms {
            headers.push(("X-LLM-Latency-Ms", latency.to_string()));
        }

        headers
    }
}

/// Runs guardrails evaluation and an LLM call concurrently.
///
/// This function handles the race between guardrails and the LLM:
/// 1. If guardrails fail (block action) before LLM completes → return blocked error
/// 2. If LLM completes first → wait for guardrails result, then decide
/// 3. If guardrails timeout → behavior depends on `on_timeout` config
///
/// # Type Parameters
/// - `T`: The LLM result type
/// - `E`: The LLM error type (must be convertible to String for logging)
///
/// # Arguments
/// - `guardrails`: The input guardrails evaluator
/// - `guardrails_future`: The guardrails evaluation future
/// - `llm_future`: The LLM provider call future
///
/// # Returns
/// - `Ok(outcome)` with the evaluation outcome containing both results
/// - `Err(guardrails_error)` if guardrails blocked the request
#[instrument(
    name = "guardrails.concurrent",
    skip(guardrails, guardrails_future, llm_future),
    fields(
        provider = %guardrails.provider_name(),
        timeout_ms = guardrails.timeout().as_millis() as u64,
        winner = tracing::field::Empty,
        blocked = tracing::field::Empty,
        guardrails_latency_ms = tracing::field::Empty,
        llm_latency_ms = tracing::field::Empty,
    )
)]
pub async fn run_concurrent_evaluation<T, E, GF, LF>(
    guardrails: &InputGuardrails,
    guardrails_future: GF,
    llm_future: LF,
) -> Result<ConcurrentEvaluationOutcome<T>, GuardrailsError>
where
    GF: std::future::Future<Output = Result<InputGuardrailsResult, GuardrailsError>>,
    LF: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    use std::time::Instant;

    use tokio::select;

    let timeout = guardrails.timeout();
    let on_timeout = guardrails.on_timeout().clone();

    let start = Instant::now();

    // Pin both futures so we can poll them
    tokio::pin!(guardrails_future);
    tokio::pin!(llm_future);

    // Race the guardrails with a timeout against the LLM call
    let guardrails_with_timeout = tokio::time::timeout(timeout, &mut guardrails_future);

    // First race: see which completes first
    select! {
        // Guardrails completed (with or without timeout)
        guardrails_result = guardrails_with_timeout => {
            let guardrails_latency_ms = start.elapsed().as_millis() as u64;

            match guardrails_result {
                Ok(Ok(result)) => {
                    // Guardrails completed successfully
                    record_guardrails_concurrent_race("guardrails_first");
                    let span = tracing::Span::current();
                    span.record("winner", "guardrails_first");
                    span.record("guardrails_latency_ms", guardrails_latency_ms);

                    if result.is_blocked() {
                        // Guardrails blocked - cancel LLM and return error
                        span.record("blocked", true);
                        tracing::info!(
                            winner = "guardrails_first",
                            action = "blocked",
                            latency_ms = guardrails_latency_ms,
                            "Concurrent guardrails blocked content before LLM completed"
                        );
                        return Err(GuardrailsError::blocked_with_violations(
                            crate::guardrails::ContentSource::UserInput,
                            "Content blocked by input guardrails (concurrent mode)",
                            result.violations().to_vec(),
                        ));
                    }
                    span.record("blocked", false);

                    // Guardrails passed - now wait for LLM
                    tracing::debug!(
                        winner = "guardrails_first",
                        action = "passed",
                        latency_ms = guardrails_latency_ms,
                        "Concurrent guardrails passed, waiting for LLM"
                    );

                    match llm_future.await {
                        Ok(llm_result) => {
                            let llm_latency_ms = start.elapsed().as_millis() as u64;
                            span.record("llm_latency_ms", llm_latency_ms);
                            Ok(ConcurrentEvaluationOutcome {
                                winner: ConcurrentRaceWinner::Guardrails,
                                guardrails_result: Some(result),
                                llm_result: Some(llm_result),
                                blocked: false,
                                guardrails_latency_ms: Some(guardrails_latency_ms),
                                llm_latency_ms: Some(llm_latency_ms),
                            })
                        }
                        Err(e) => {
                            // LLM failed but guardrails passed - return LLM error
                            let llm_latency_ms = start.elapsed().as_millis() as u64;
                            span.record("llm_latency_ms", llm_latency_ms);
                            tracing::warn!(
                                llm_error = %e,
                                "LLM failed after guardrails passed in concurrent mode"
                            );
                            Ok(ConcurrentEvaluationOutcome {
                                winner: ConcurrentRaceWinner::Guardrails,
                                guardrails_result: Some(result),
                                llm_result: None,
                                blocked: false,
                                guardrails_latency_ms: Some(guardrails_latency_ms),
                                llm_latency_ms: Some(llm_latency_ms),
                            })
                        }
                    }
                }
                Ok(Err(e)) => {
                    // Guardrails provider error
                    let span = tracing::Span::current();
                    span.record("winner", "guardrails_first");
                    span.record("guardrails_latency_ms", guardrails_latency_ms);
                    tracing::warn!(
                        error = %e,
                        latency_ms = guardrails_latency_ms,
                        "Guardrails provider error in concurrent mode"
                    );
                    return Err(e);
                }
                Err(_timeout) => {
                    // Guardrails timed out
                    let guardrails_latency_ms = timeout.as_millis() as u64;
                    record_guardrails_concurrent_race("guardrails_timed_out");
                    let span = tracing::Span::current();
                    span.record("winner", "guardrails_timed_out");
                    span.record("guardrails_latency_ms", guardrails_latency_ms);

                    match on_timeout {
                        crate::config::GuardrailsTimeoutAction::Block => {
                            span.record("blocked", true);
                            tracing::warn!(
                                timeout_ms = guardrails_latency_ms,
                                "Concurrent guardrails timed out, blocking request"
                            );
                            return Err(GuardrailsError::timeout(
                                guardrails.provider_name(),
                                guardrails_latency_ms,
                            ));
                        }
                        crate::config::GuardrailsTimeoutAction::Allow => {
                            span.record("blocked", false);
                            // Timeout with allow - wait for LLM
                            tracing::info!(
                                timeout_ms = guardrails_latency_ms,
                                "Concurrent guardrails timed out, allowing request (on_timeout=allow)"
                            );

                            match llm_future.await {
                                Ok(llm_result) => {
                                    let llm_latency_ms = start.elapsed().as_millis() as u64;
                                    span.record("llm_latency_ms", llm_latency_ms);
                                    Ok(ConcurrentEvaluationOutcome {
                                        winner: ConcurrentRaceWinner::GuardrailsTimedOut,
                                        guardrails_result: None,
                                        llm_result: Some(llm_result),
                                        blocked: false,
                                        guardrails_latency_ms: Some(guardrails_latency_ms),
                                        llm_latency_ms: Some(llm_latency_ms),
                                    })
                                }
                                Err(e) => {
                                    let llm_latency_ms = start.elapsed().as_millis() as u64;
                                    span.record("llm_latency_ms", llm_latency_ms);
                                    tracing::warn!(
                                        llm_error = %e,
                                        "LLM failed after guardrails timed out in concurrent mode"
                                    );
                                    Ok(ConcurrentEvaluationOutcome {
                                        winner: ConcurrentRaceWinner::GuardrailsTimedOut,
                                        guardrails_result: None,
                                        llm_result: None,
                                        blocked: false,
                                        guardrails_latency_ms: Some(guardrails_latency_ms),
                                        llm_latency_ms: Some(llm_latency_ms),
                                    })
                                }
                            }
                        }
                    }
                }
            }
        }

        // LLM completed first
        llm_result = &mut llm_future => {
            let llm_latency_ms = start.elapsed().as_millis() as u64;
            record_guardrails_concurrent_race("llm_first");
            let span = tracing::Span::current();
            span.record("winner", "llm_first");
            span.record("llm_latency_ms", llm_latency_ms);

            tracing::debug!(
                winner = "llm_first",
                latency_ms = llm_latency_ms,
                "LLM completed first in concurrent mode, waiting for guardrails"
            );

            // LLM completed first - now we must wait for guardrails to complete
            // Apply timeout to remaining guardrails wait time
            let remaining_timeout = timeout.saturating_sub(start.elapsed());
            let guardrails_result = tokio::time::timeout(remaining_timeout, guardrails_future).await;

            let guardrails_latency_ms = start.elapsed().as_millis() as u64;

            match guardrails_result {
                Ok(Ok(result)) => {
                    span.record("guardrails_latency_ms", guardrails_latency_ms);
                    if result.is_blocked() {
                        // Guardrails blocked - discard LLM result
                        span.record("blocked", true);
                        tracing::info!(
                            winner = "llm_first",
                            action = "blocked",
                            guardrails_latency_ms,
                            llm_latency_ms,
                            "Guardrails blocked content after LLM completed"
                        );
                        return Err(GuardrailsError::blocked_with_violations(
                            crate::guardrails::ContentSource::UserInput,
                            "Content blocked by input guardrails (concurrent mode, LLM completed first)",
                            result.violations().to_vec(),
                        ));
                    }
                    span.record("blocked", false);

                    // Both completed, guardrails passed
                    match llm_result {
                        Ok(llm) => Ok(ConcurrentEvaluationOutcome {
                            winner: ConcurrentRaceWinner::Llm,
                            guardrails_result: Some(result),
                            llm_result: Some(llm),
                            blocked: false,
                            guardrails_latency_ms: Some(guardrails_latency_ms),
                            llm_latency_ms: Some(llm_latency_ms),
                        }),
                        Err(e) => {
                            tracing::warn!(
                                llm_error = %e,
                                "LLM result was an error in concurrent mode"
                            );
                            Ok(ConcurrentEvaluationOutcome {
                                winner: ConcurrentRaceWinner::Llm,
                                guardrails_result: Some(result),
                                llm_result: None,
                                blocked: false,
                                guardrails_latency_ms: Some(guardrails_latency_ms),
                                llm_latency_ms: Some(llm_latency_ms),
                            })
                        }
                    }
                }
                Ok(Err(e)) => {
                    // Guardrails provider error after LLM completed
                    span.record("guardrails_latency_ms", guardrails_latency_ms);
                    tracing::warn!(
                        error = %e,
                        "Guardrails provider error after LLM completed in concurrent mode"
                    );
                    Err(e)
                }
                Err(_timeout) => {
                    // Guardrails timed out after LLM completed
                    span.record("guardrails_latency_ms", guardrails_latency_ms);
                    match on_timeout {
                        crate::config::GuardrailsTimeoutAction::Block => {
                            span.record("blocked", true);
                            tracing::warn!(
                                timeout_ms = timeout.as_millis(),
                                "Guardrails timed out after LLM completed, blocking request"
                            );
                            return Err(GuardrailsError::timeout(
                                guardrails.provider_name(),
                                timeout.as_millis() as u64,
                            ));
                        }
                        crate::config::GuardrailsTimeoutAction::Allow => {
                            span.record("blocked", false);
                            tracing::info!(
                                timeout_ms = timeout.as_millis(),
                                "Guardrails timed out after LLM completed, allowing (on_timeout=allow)"
                            );
                            match llm_result {
                                Ok(llm) => Ok(ConcurrentEvaluationOutcome {
                                    winner: ConcurrentRaceWinner::Llm,
                                    guardrails_result: None,
                                    llm_result: Some(llm),
                                    blocked: false,
                                    guardrails_latency_ms: Some(guardrails_latency_ms),
                                    llm_latency_ms: Some(llm_latency_ms),
                                }),
                                Err(e) => {
                                    tracing::warn!(
                                        llm_error = %e,
                                        "LLM result was an error in concurrent mode (guardrails timed out)"
                                    );
                                    Ok(ConcurrentEvaluationOutcome {
                                        winner: ConcurrentRaceWinner::Llm,
                                        guardrails_result: None,
                                        llm_result: None,
                                        blocked: false,
                                        guardrails_latency_ms: Some(guardrails_latency_ms),
                                        llm_latency_ms: Some(llm_latency_ms),
                                    })
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output Guardrails
// ─────────────────────────────────────────────────────────────────────────────

/// Output guardrails evaluator.
///
/// Evaluates LLM output content against guardrails policies before returning to the user.
/// This is used for post-response evaluation in non-streaming mode.
pub struct OutputGuardrails {
    /// The guardrails provider to use for evaluation.
    provider: Arc<dyn GuardrailsProvider>,
    /// Action executor for applying configured actions.
    action_executor: ActionExecutor,
    /// Retry configuration.
    retry_config: GuardrailsRetryConfig,
    /// Timeout for evaluation.
    timeout: Duration,
    /// Action to take on provider error.
    on_error: crate::config::GuardrailsErrorAction,
    /// Streaming evaluation mode.
    streaming_mode: crate::config::StreamingGuardrailsMode,
}

impl OutputGuardrails {
    /// Creates a new output guardrails evaluator from configuration.
    ///
    /// Returns `None` if guardrails are disabled or not configured.
    pub fn from_config(
        config: &GuardrailsConfig,
        http_client: &Client,
    ) -> Result<Option<Self>, GuardrailsError> {
        if !config.enabled {
            return Ok(None);
        }

        let Some(output_config) = &config.output else {
            return Ok(None);
        };

        if !output_config.enabled {
            return Ok(None);
        }

        let provider = create_provider(&output_config.provider, http_client)?;
        let action_executor = ActionExecutor::from_output_config(output_config);
        let retry_config = GuardrailsRetryConfig::default();

        Ok(Some(Self {
            provider,
            action_executor,
            retry_config,
            timeout: Duration::from_millis(output_config.timeout_ms),
            on_error: output_config.on_error.clone(),
            streaming_mode: output_config.streaming_mode.clone(),
        }))
    }

    /// Creates output guardrails from a specific output config (for testing).
    pub fn from_output_config(
        config: &OutputGuardrailsConfig,
        http_client: &Client,
    ) -> Result<Self, GuardrailsError> {
        let provider = create_provider(&config.provider, http_client)?;
        let action_executor = ActionExecutor::from_output_config(config);
        let retry_config = GuardrailsRetryConfig::default();

        Ok(Self {
            provider,
            action_executor,
            retry_config,
            timeout: Duration::from_millis(config.timeout_ms),
            on_error: config.on_error.clone(),
            streaming_mode: config.streaming_mode.clone(),
        })
    }

    /// Evaluates LLM response content against guardrails.
    ///
    /// Extracts text from the assistant's response and evaluates it.
    /// Returns the resolved action to take based on the evaluation result.
    #[instrument(skip(self, content), fields(provider = %self.provider.name()))]
    pub async fn evaluate_response(
        &self,
        content: &str,
        request_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<OutputGuardrailsResult, GuardrailsError> {
        if content.is_empty() {
            tracing::debug!("No text content to evaluate");
            return Ok(OutputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: content.to_string(),
            });
        }

        // Build the guardrails request for LLM output
        let mut request = GuardrailsRequest::llm_output(content);
        if let Some(id) = request_id {
            request = request.with_request_id(id);
        }
        if let Some(id) = user_id {
            request = request.with_user_id(id);
        }

        let start = std::time::Instant::now();

        // Evaluate with timeout
        let evaluation_result =
            tokio::time::timeout(self.timeout, self.evaluate_with_retry(&request)).await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let response = match evaluation_result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // Provider error - record error metrics
                record_guardrails_error(self.provider.name(), "output", e.error_type_for_metrics());
                record_guardrails_evaluation(
                    self.provider.name(),
                    "output",
                    "error",
                    latency_ms as f64 / 1000.0,
                );
                return self.handle_provider_error(e, content);
            }
            Err(_) => {
                // Timeout - record timeout metrics
                record_guardrails_timeout(self.provider.name(), "output");
                record_guardrails_evaluation(
                    self.provider.name(),
                    "output",
                    "timeout",
                    latency_ms as f64 / 1000.0,
                );
                return self.handle_timeout(content);
            }
        };

        // Apply configured actions
        let action = self.action_executor.resolve_action(&response, content);
        let result_label = resolved_action_label(&action);

        // Record evaluation metrics
        record_evaluation_metrics(
            self.provider.name(),
            "output",
            result_label,
            Some(latency_ms),
            &response.violations,
        );

        // Record span events for each violation for distributed tracing
        for violation in &response.violations {
            tracing::event!(
                tracing::Level::INFO,
                category = %violation.category,
                severity = %violation.severity,
                confidence = violation.confidence,
                message = violation.message.as_deref().unwrap_or(""),
                "Output guardrails violation detected"
            );
        }

        tracing::debug!(
            passed = response.passed,
            violations = response.violations.len(),
            action = ?action,
            "Output guardrails evaluation complete"
        );

        Ok(OutputGuardrailsResult {
            action,
            response,
            evaluated_text: content.to_string(),
        })
    }

    /// Evaluates the request with retry logic.
    async fn evaluate_with_retry(
        &self,
        request: &GuardrailsRequest,
    ) -> Result<GuardrailsResponse, GuardrailsError> {
        let max_attempts = if self.retry_config.enabled {
            self.retry_config.max_retries + 1
        } else {
            1
        };

        let mut last_error = None;

        for attempt in 0..max_attempts {
            match self.provider.evaluate(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::debug!(
                            provider = self.provider.name(),
                            attempt = attempt + 1,
                            "Output guardrails evaluation succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if error.is_retryable() && attempt < max_attempts - 1 {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        tracing::warn!(
                            provider = self.provider.name(),
                            error = %error,
                            attempt = attempt + 1,
                            max_attempts = max_attempts,
                            delay_ms = delay.as_millis(),
                            "Retryable output guardrails error, will retry after delay"
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(error);
                        continue;
                    }

                    if attempt > 0 {
                        tracing::warn!(
                            provider = self.provider.name(),
                            error = %error,
                            attempts = attempt + 1,
                            "Output guardrails evaluation failed after all retry attempts"
                        );
                    }
                    return Err(error);
                }
            }
        }

        // This should only be reached if max_attempts is 0, which shouldn't happen
        Err(last_error.unwrap_or_else(|| GuardrailsError::internal("No evaluation attempts made")))
    }

    /// Handles a provider error based on configuration.
    fn handle_provider_error(
        &self,
        error: GuardrailsError,
        text: &str,
    ) -> Result<OutputGuardrailsResult, GuardrailsError> {
        use crate::config::GuardrailsErrorAction;

        tracing::warn!(
            error = %error,
            on_error = ?self.on_error,
            "Output guardrails provider error"
        );

        match self.on_error {
            GuardrailsErrorAction::Block => Err(error),
            GuardrailsErrorAction::Allow => Ok(OutputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: text.to_string(),
            }),
            GuardrailsErrorAction::LogAndAllow => {
                tracing::error!(
                    error = %error,
                    "Output guardrails provider error - allowing response (log_and_allow)"
                );
                Ok(OutputGuardrailsResult {
                    action: ResolvedAction::Allow,
                    response: GuardrailsResponse::passed(),
                    evaluated_text: text.to_string(),
                })
            }
        }
    }

    /// Handles a timeout based on configuration.
    fn handle_timeout(&self, text: &str) -> Result<OutputGuardrailsResult, GuardrailsError> {
        use crate::config::GuardrailsErrorAction;

        tracing::warn!(
            timeout_ms = %self.timeout.as_millis(),
            on_error = ?self.on_error,
            "Output guardrails evaluation timed out"
        );

        // For output guardrails, timeout is handled via on_error (there's no on_timeout config)
        match self.on_error {
            GuardrailsErrorAction::Block => Err(GuardrailsError::timeout(
                self.provider.name(),
                self.timeout.as_millis() as u64,
            )),
            GuardrailsErrorAction::Allow => Ok(OutputGuardrailsResult {
                action: ResolvedAction::Allow,
                response: GuardrailsResponse::passed(),
                evaluated_text: text.to_string(),
            }),
            GuardrailsErrorAction::LogAndAllow => {
                tracing::error!(
                    timeout_ms = %self.timeout.as_millis(),
                    "Output guardrails evaluation timed out - allowing response (log_and_allow)"
                );
                Ok(OutputGuardrailsResult {
                    action: ResolvedAction::Allow,
                    response: GuardrailsResponse::passed(),
                    evaluated_text: text.to_string(),
                })
            }
        }
    }

    /// Returns the provider name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Returns the provider for streaming use.
    pub fn provider(&self) -> Arc<dyn GuardrailsProvider> {
        self.provider.clone()
    }

    /// Returns the action executor for streaming use.
    pub fn action_executor(&self) -> ActionExecutor {
        self.action_executor.clone()
    }

    /// Returns the on_error action for streaming use.
    pub fn on_error(&self) -> crate::config::GuardrailsErrorAction {
        self.on_error.clone()
    }

    /// Returns the streaming evaluation mode.
    pub fn streaming_mode(&self) -> crate::config::StreamingGuardrailsMode {
        self.streaming_mode.clone()
    }
}

/// Result of output guardrails evaluation.
#[derive(Debug, Clone)]
pub struct OutputGuardrailsResult {
    /// The resolved action to take.
    pub action: ResolvedAction,
    /// The raw guardrails response.
    pub response: GuardrailsResponse,
    /// The text that was evaluated.
    pub evaluated_text: String,
}

impl OutputGuardrailsResult {
    /// Returns true if the content should be blocked.
    pub fn is_blocked(&self) -> bool {
        self.action.is_blocked()
    }

    /// Returns true if the content was modified (redacted).
    pub fn is_modified(&self) -> bool {
        self.action.is_modified()
    }

    /// Returns the modified content if redaction was applied.
    pub fn modified_content(&self) -> Option<&str> {
        match &self.action {
            ResolvedAction::Redact {
                modified_content, ..
            } => Some(modified_content),
            _ => None,
        }
    }

    /// Returns the violations found during evaluation.
    pub fn violations(&self) -> &[Violation] {
        self.action.violations()
    }

    /// Returns a string label for the action result (for metrics).
    pub fn result_label(&self) -> &'static str {
        resolved_action_label(&self.action)
    }

    /// Creates response headers for the output guardrails result.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();

        // Add result header
        let result = match &self.action {
            ResolvedAction::Allow => "passed",
            ResolvedAction::Block { .. } => "blocked",
            ResolvedAction::Warn { .. } => "warned",
            ResolvedAction::Log { .. } => "logged",
            ResolvedAction::Redact { .. } => "redacted",
        };
        headers.push(("X-Guardrails-Output-Result", result.to_string()));

        // Add violations header if any
        if !self.response.violations.is_empty() {
            let violations: Vec<String> = self
                .response
                .violations
                .iter()
                .map(|v| format!("{}:{}", v.category, v.severity))
                .collect();
            headers.push(("X-Guardrails-Output-Violations", violations.join(",")));
        }

        // Add latency header if available
        if let Some(latency_ms) = self.response.latency_ms {
            headers.push(("X-Guardrails-Output-Latency-Ms", latency_ms.to_string()));
        }

        headers
    }
}

/// Extracts assistant content from a chat completion response JSON.
///
/// This function parses the response body and extracts the content from the
/// first choice's message. Returns an empty string if the content cannot be extracted.
pub fn extract_assistant_content_from_response(body: &[u8]) -> String {
    // Parse the response body as JSON
    let Ok(json): Result<serde_json::Value, _> = serde_json::from_slice(body) else {
        return String::new();
    };

    // Extract content from choices[0].message.content
    if let Some(choices) = json.get("choices").and_then(|c| c.as_array())
        && let Some(first_choice) = choices.first()
        && let Some(message) = first_choice.get("message")
        && let Some(content) = message.get("content").and_then(|c| c.as_str())
    {
        return content.to_string();
    }

    String::new()
}

/// Extracts all text content from chat completion messages.
///
/// Concatenates text from:
/// - System messages
/// - User messages (text content or text parts)
/// - Assistant messages (content, reasoning)
/// - Tool messages
/// - Developer messages
pub fn extract_text_from_messages(messages: &[Message]) -> String {
    let mut parts = Vec::new();

    for message in messages {
        match message {
            Message::System { content, .. } => {
                if let Some(text) = extract_text_from_content(content) {
                    parts.push(text);
                }
            }
            Message::User { content, .. } => {
                if let Some(text) = extract_text_from_content(content) {
                    parts.push(text);
                }
            }
            Message::Assistant {
                content, reasoning, ..
            } => {
                if let Some(c) = content
                    && let Some(text) = extract_text_from_content(c)
                {
                    parts.push(text);
                }
                if let Some(r) = reasoning {
                    parts.push(r.clone());
                }
            }
            Message::Tool { content, .. } => {
                if let Some(text) = extract_text_from_content(content) {
                    parts.push(text);
                }
            }
            Message::Developer { content, .. } => {
                if let Some(text) = extract_text_from_content(content) {
                    parts.push(text);
                }
            }
        }
    }

    parts.join("\n\n")
}

/// Extracts text from message content.
fn extract_text_from_content(content: &MessageContent) -> Option<String> {
    match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                None
            } else {
                Some(text.clone())
            }
        }
        MessageContent::Parts(parts) => {
            let text_parts: Vec<String> = parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text, .. } => {
                        if text.is_empty() {
                            None
                        } else {
                            Some(text.clone())
                        }
                    }
                    _ => None, // Skip image, audio, video parts
                })
                .collect();

            if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completions API Text Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts text content from a completion prompt.
///
/// Handles all prompt formats:
/// - Single text string
/// - Array of text strings
/// - Token arrays (skipped, not textual)
pub fn extract_text_from_completion_prompt(prompt: &CompletionPrompt) -> String {
    match prompt {
        CompletionPrompt::Text(text) => text.clone(),
        CompletionPrompt::TextArray(texts) => texts.join("\n"),
        // Token arrays don't have meaningful text representation
        CompletionPrompt::Tokens(_) | CompletionPrompt::TokenArrays(_) => String::new(),
    }
}

/// Extracts text content from a completion payload.
///
/// Extracts text from the prompt field.
pub fn extract_text_from_completion_payload(payload: &CreateCompletionPayload) -> String {
    extract_text_from_completion_prompt(&payload.prompt)
}

/// Extracts text content from a completion response JSON.
///
/// Extracts text from `choices[].text` fields.
pub fn extract_text_from_completion_response(body: &[u8]) -> String {
    let Ok(json): Result<serde_json::Value, _> = serde_json::from_slice(body) else {
        return String::new();
    };

    let Some(choices) = json.get("choices").and_then(|c| c.as_array()) else {
        return String::new();
    };

    let texts: Vec<&str> = choices
        .iter()
        .filter_map(|choice| choice.get("text").and_then(|t| t.as_str()))
        .collect();

    texts.join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses API Text Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts text content from a responses payload input.
///
/// Handles all input formats:
/// - Simple text string
/// - Array of input items (messages, function calls, etc.)
pub fn extract_text_from_responses_input(input: &ResponsesInput) -> String {
    match input {
        ResponsesInput::Text(text) => text.clone(),
        ResponsesInput::Items(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(extract_text_from_input_item)
                .collect();
            parts.join("\n\n")
        }
    }
}

/// Extracts text from a single responses input item.
fn extract_text_from_input_item(item: &ResponsesInputItem) -> Option<String> {
    match item {
        ResponsesInputItem::EasyMessage(msg) => extract_text_from_easy_message(msg),
        ResponsesInputItem::MessageItem(msg) => {
            let texts: Vec<String> = msg
                .content
                .iter()
                .filter_map(extract_text_from_input_content_item)
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        ResponsesInputItem::Reasoning(reasoning) => {
            // Extract text from reasoning content
            let mut parts = Vec::new();
            if let Some(content) = &reasoning.content {
                for item in content {
                    parts.push(item.text.clone());
                }
            }
            for summary in &reasoning.summary {
                parts.push(summary.text.clone());
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        ResponsesInputItem::FunctionCall(fc) => Some(format!("{}({})", fc.name, fc.arguments)),
        ResponsesInputItem::FunctionCallOutput(output) => Some(output.output.clone()),
        ResponsesInputItem::OutputMessage(msg) => {
            let texts: Vec<String> = msg
                .content
                .iter()
                .filter_map(extract_text_from_output_content_item)
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        ResponsesInputItem::OutputFunctionCall(fc) => {
            Some(format!("{}({})", fc.name, fc.arguments))
        }
        // Tool calls don't have meaningful text content for guardrails
        ResponsesInputItem::WebSearchCall(_)
        | ResponsesInputItem::FileSearchCall(_)
        | ResponsesInputItem::ImageGeneration(_) => None,
    }
}

/// Extracts text from an easy input message.
fn extract_text_from_easy_message(msg: &EasyInputMessage) -> Option<String> {
    match &msg.content {
        EasyInputMessageContent::Text(text) => {
            if text.is_empty() {
                None
            } else {
                Some(text.clone())
            }
        }
        EasyInputMessageContent::Parts(parts) => {
            let texts: Vec<String> = parts
                .iter()
                .filter_map(extract_text_from_input_content_item)
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
    }
}

/// Extracts text from an input content item.
fn extract_text_from_input_content_item(item: &ResponseInputContentItem) -> Option<String> {
    match item {
        ResponseInputContentItem::InputText { text, .. } => {
            if text.is_empty() {
                None
            } else {
                Some(text.clone())
            }
        }
        // Skip non-text content
        ResponseInputContentItem::InputImage { .. }
        | ResponseInputContentItem::InputFile { .. }
        | ResponseInputContentItem::InputAudio { .. } => None,
    }
}

/// Extracts text from an output content item.
fn extract_text_from_output_content_item(item: &OutputMessageContentItem) -> Option<String> {
    match item {
        OutputMessageContentItem::OutputText { text, .. } => {
            if text.is_empty() {
                None
            } else {
                Some(text.clone())
            }
        }
        OutputMessageContentItem::Refusal { refusal } => {
            if refusal.is_empty() {
                None
            } else {
                Some(refusal.clone())
            }
        }
    }
}

/// Extracts text content from a responses payload.
///
/// Extracts text from the input field and instructions.
pub fn extract_text_from_responses_payload(payload: &CreateResponsesPayload) -> String {
    let mut parts = Vec::new();

    // Extract from instructions (system prompt)
    if let Some(instructions) = &payload.instructions
        && !instructions.is_empty()
    {
        parts.push(instructions.clone());
    }

    // Extract from input
    if let Some(input) = &payload.input {
        let input_text = extract_text_from_responses_input(input);
        if !input_text.is_empty() {
            parts.push(input_text);
        }
    }

    parts.join("\n\n")
}

/// Extracts text content from a responses API response JSON.
///
/// Extracts text from `output[]` items (messages, reasoning).
pub fn extract_text_from_responses_response(body: &[u8]) -> String {
    let Ok(json): Result<serde_json::Value, _> = serde_json::from_slice(body) else {
        return String::new();
    };

    let mut parts = Vec::new();

    // Extract from output_text field if present
    if let Some(output_text) = json.get("output_text").and_then(|t| t.as_str())
        && !output_text.is_empty()
    {
        return output_text.to_string();
    }

    // Fall back to extracting from output array
    if let Some(output) = json.get("output").and_then(|o| o.as_array()) {
        for item in output {
            if let Some(text) = extract_text_from_output_json(item) {
                parts.push(text);
            }
        }
    }

    parts.join("\n\n")
}

/// Extracts text from an output item JSON.
fn extract_text_from_output_json(item: &serde_json::Value) -> Option<String> {
    let item_type = item.get("type").and_then(|t| t.as_str())?;

    match item_type {
        "message" => {
            // Extract from content array
            let content = item.get("content").and_then(|c| c.as_array())?;
            let texts: Vec<&str> = content
                .iter()
                .filter_map(|c| {
                    let content_type = c.get("type").and_then(|t| t.as_str())?;
                    match content_type {
                        "output_text" => c.get("text").and_then(|t| t.as_str()),
                        "refusal" => c.get("refusal").and_then(|r| r.as_str()),
                        _ => None,
                    }
                })
                .filter(|s| !s.is_empty())
                .collect();

            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        "reasoning" => {
            let mut parts = Vec::new();

            // Extract from content
            if let Some(content) = item.get("content").and_then(|c| c.as_array()) {
                for c in content {
                    if let Some(text) = c.get("text").and_then(|t| t.as_str())
                        && !text.is_empty()
                    {
                        parts.push(text);
                    }
                }
            }

            // Extract from summary
            if let Some(summary) = item.get("summary").and_then(|s| s.as_array()) {
                for s in summary {
                    if let Some(text) = s.get("text").and_then(|t| t.as_str())
                        && !text.is_empty()
                    {
                        parts.push(text);
                    }
                }
            }

            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        "function_call" => {
            let name = item.get("name").and_then(|n| n.as_str()).unwrap_or("");
            let args = item.get("arguments").and_then(|a| a.as_str()).unwrap_or("");
            if name.is_empty() && args.is_empty() {
                None
            } else {
                Some(format!("{}({})", name, args))
            }
        }
        _ => None,
    }
}

/// Creates a guardrails provider from configuration.
fn create_provider(
    config: &GuardrailsProviderConfig,
    http_client: &Client,
) -> Result<Arc<dyn GuardrailsProvider>, GuardrailsError> {
    match config {
        GuardrailsProviderConfig::OpenaiModeration {
            api_key,
            base_url,
            model,
        } => {
            let api_key = api_key.clone().ok_or_else(|| {
                GuardrailsError::config_error("OpenAI Moderation requires an API key")
            })?;
            let provider = OpenAIModerationProvider::with_base_url(
                http_client.clone(),
                api_key,
                base_url,
                model,
            );
            Ok(Arc::new(provider))
        }

        #[cfg(feature = "provider-bedrock")]
        GuardrailsProviderConfig::Bedrock {
            guardrail_id,
            guardrail_version,
            region,
            access_key_id,
            secret_access_key,
            trace_enabled,
        } => {
            // Get region from config or environment
            let region = region
                .clone()
                .or_else(|| std::env::var("AWS_REGION").ok())
                .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
                .ok_or_else(|| {
                    GuardrailsError::config_error(
                        "Bedrock Guardrails requires a region. Set region in config or AWS_REGION environment variable."
                    )
                })?;

            // Determine credential source
            let credential_source = match (access_key_id.clone(), secret_access_key.clone()) {
                (Some(key_id), Some(secret)) => crate::config::AwsCredentials::Static {
                    access_key_id: key_id,
                    secret_access_key: secret,
                    session_token: None,
                },
                _ => crate::config::AwsCredentials::Default,
            };

            let provider = BedrockGuardrailsProvider::new(
                http_client.clone(),
                guardrail_id.clone(),
                guardrail_version.clone(),
                region,
                credential_source,
                *trace_enabled,
            );
            Ok(Arc::new(provider))
        }

        GuardrailsProviderConfig::AzureContentSafety {
            endpoint,
            api_key,
            api_version,
            thresholds,
            blocklist_names,
        } => {
            let mut provider = AzureContentSafetyProvider::new(
                http_client.clone(),
                endpoint,
                api_key,
                api_version,
            );

            if !thresholds.is_empty() {
                provider = provider.with_thresholds(thresholds.clone());
            }
            if !blocklist_names.is_empty() {
                provider = provider.with_blocklists(blocklist_names.clone());
            }

            Ok(Arc::new(provider))
        }

        GuardrailsProviderConfig::Blocklist {
            patterns,
            case_insensitive,
        } => {
            let provider = BlocklistProvider::new(patterns.clone(), *case_insensitive)?;
            Ok(Arc::new(provider))
        }

        GuardrailsProviderConfig::PiiRegex {
            email,
            phone,
            ssn,
            credit_card,
            ip_address,
            date_of_birth,
        } => {
            use super::pii_regex::{PiiRegexConfig, PiiRegexProvider};
            let config = PiiRegexConfig {
                email: *email,
                phone: *phone,
                ssn: *ssn,
                credit_card: *credit_card,
                ip_address: *ip_address,
                date_of_birth: *date_of_birth,
            };
            let provider = PiiRegexProvider::new(config)?;
            Ok(Arc::new(provider))
        }

        GuardrailsProviderConfig::ContentLimits {
            max_characters,
            max_words,
            max_lines,
        } => {
            use super::content_limits::{ContentLimitsConfig, ContentLimitsProvider};
            let config = ContentLimitsConfig {
                max_characters: *max_characters,
                max_words: *max_words,
                max_lines: *max_lines,
            };
            let provider = ContentLimitsProvider::new(config);
            Ok(Arc::new(provider))
        }

        GuardrailsProviderConfig::Custom(custom_config) => {
            let provider = CustomHttpProvider::from_config(http_client.clone(), custom_config)?;
            Ok(Arc::new(provider))
        }
    }
}

/// Returns a string label for a resolved action (for metrics).
fn resolved_action_label(action: &ResolvedAction) -> &'static str {
    match action {
        ResolvedAction::Allow => "passed",
        ResolvedAction::Block { .. } => "blocked",
        ResolvedAction::Warn { .. } => "warned",
        ResolvedAction::Log { .. } => "logged",
        ResolvedAction::Redact { .. } => "redacted",
    }
}

/// Records metrics for a guardrails evaluation result.
fn record_evaluation_metrics(
    provider: &str,
    stage: &str,
    result: &str,
    latency_ms: Option<u64>,
    violations: &[Violation],
) {
    let latency_secs = latency_ms.map(|ms| ms as f64 / 1000.0).unwrap_or(0.0);
    record_guardrails_evaluation(provider, stage, result, latency_secs);

    // Record individual violations
    for violation in violations {
        record_guardrails_violation(
            provider,
            &violation.category.to_string(),
            &violation.severity.to_string(),
            result,
        );
    }
}
