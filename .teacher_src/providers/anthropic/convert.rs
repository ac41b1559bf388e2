//! Anthropic format conversion functions.
//!
//! Converts between OpenAI-compatible formats and Anthropic Messages API format.

use super::types::{
    AnthropicCacheControl, AnthropicCacheControlType, AnthropicContent, AnthropicEffort,
    AnthropicMessage, AnthropicOutputConfig, AnthropicResponse, AnthropicThinkingConfig,
    AnthropicTool, AnthropicToolChoice, ContentBlock, ImageSource, OpenAIChoice, OpenAIMessage,
    OpenAIResponse, OpenAIToolCall, OpenAIToolCallFunction, OpenAIUsage, PromptTokensDetails,
};
use crate::{
    api_types::{
        chat_completion::{
            CacheControl, ContentPart, CreateChatCompletionReasoning, Message, MessageContent,
            ReasoningEffort, Stop, ToolChoice, ToolChoiceDefaults, ToolDefinition,
        },
        responses::{
            CreateResponsesResponse, EasyInputMessageContent, EasyInputMessageRole,
            InputMessageItemRole, MessageType, OutputItemFunctionCall,
            OutputItemFunctionCallStatus, OutputItemFunctionCallType, OutputMessage,
            OutputMessageContentItem, OutputMessageStatus, ResponseInputContentItem, ResponseType,
            ResponsesInput, ResponsesInputItem, ResponsesOutputItem, ResponsesReasoning,
            ResponsesReasoningConfig, ResponsesReasoningConfigOutput, ResponsesReasoningEffort,
            ResponsesReasoningType, ResponsesResponseStatus, ResponsesToolChoice,
            ResponsesToolChoiceDefault, ResponsesToolDefinition, ResponsesUsage,
            ResponsesUsageInputTokensDetails, ResponsesUsageOutputTokensDetails,
        },
    },
    middleware::FileSearchToolArguments,
    providers::image::parse_data_url,
};

// ============================================================================
// Chat Completion Conversion Functions
// ============================================================================

/// Convert OpenAI-compatible CacheControl to Anthropic CacheControl.
///
/// Both formats use `type: "ephemeral"`, so this is a direct mapping.
fn convert_cache_control(cache_control: Option<&CacheControl>) -> Option<AnthropicCacheControl> {
    cache_control.map(|cc| AnthropicCacheControl {
        type_: match cc.type_ {
            crate::api_types::chat_completion::CacheControlType::Ephemeral => {
                AnthropicCacheControlType::Ephemeral
            }
        },
    })
}

/// Extract text content from MessageContent
pub fn extract_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| {
                if let ContentPart::Text { text, .. } = p {
                    Some(text.as_str())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

/// Convert MessageContent to Anthropic ContentBlocks, including images.
///
/// Note: HTTP image URLs should be preprocessed using `preprocess_messages_for_images`
/// before calling this function. Any remaining HTTP URLs will be skipped with a warning.
pub fn convert_content_to_blocks(content: &MessageContent) -> Vec<ContentBlock> {
    match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                vec![]
            } else {
                vec![ContentBlock::Text {
                    text: text.clone(),
                    cache_control: None,
                }]
            }
        }
        MessageContent::Parts(parts) => {
            let mut blocks = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text {
                        text,
                        cache_control,
                    } => {
                        if !text.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: text.clone(),
                                cache_control: convert_cache_control(cache_control.as_ref()),
                            });
                        }
                    }
                    ContentPart::ImageUrl {
                        image_url,
                        cache_control,
                    } => {
                        let url = &image_url.url;
                        let cc = convert_cache_control(cache_control.as_ref());
                        // Check if it's an HTTPS URL - Anthropic supports direct URL references
                        if url.starts_with("https://") {
                            blocks.push(ContentBlock::Image {
                                source: ImageSource::Url { url: url.clone() },
                                cache_control: cc,
                            });
                        } else if url.starts_with("http://") {
                            // Anthropic only supports HTTPS URLs, not HTTP
                            tracing::warn!(
                                url = %url,
                                "Anthropic only supports HTTPS image URLs, not HTTP. Image skipped."
                            );
                        } else {
                            // Try to parse as data URL (base64)
                            match parse_data_url(url) {
                                Ok(image_data) => {
                                    blocks.push(ContentBlock::Image {
                                        source: ImageSource::Base64 {
                                            media_type: image_data.media_type,
                                            data: image_data.data,
                                        },
                                        cache_control: cc,
                                    });
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        url = %url,
                                        error = %e,
                                        "Failed to parse image data URL. Image skipped."
                                    );
                                }
                            }
                        }
                    }
                    // Audio and video not supported by Anthropic
                    ContentPart::InputAudio { .. }
                    | ContentPart::InputVideo { .. }
                    | ContentPart::VideoUrl { .. } => {
                        tracing::warn!(
                            "Anthropic provider does not support audio/video content. Content skipped."
                        );
                    }
                }
            }
            blocks
        }
    }
}

/// Convert OpenAI tools to Anthropic format
pub fn convert_tools(tools: Option<Vec<ToolDefinition>>) -> Option<Vec<AnthropicTool>> {
    tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| AnthropicTool {
                name: tool.function.name,
                description: tool.function.description,
                input_schema: tool
                    .function
                    .parameters
                    .unwrap_or(serde_json::json!({"type": "object", "properties": {}})),
                cache_control: convert_cache_control(tool.cache_control.as_ref()),
            })
            .collect()
    })
}

/// Convert OpenAI tool_choice to Anthropic format
pub fn convert_tool_choice(tool_choice: Option<ToolChoice>) -> Option<AnthropicToolChoice> {
    tool_choice.and_then(|tc| match tc {
        ToolChoice::String(default) => match default {
            ToolChoiceDefaults::Auto => Some(AnthropicToolChoice::Auto),
            ToolChoiceDefaults::Required => Some(AnthropicToolChoice::Any),
            ToolChoiceDefaults::None => None, // Anthropic doesn't have "none", just don't send tools
        },
        ToolChoice::Named(named) => Some(AnthropicToolChoice::Tool {
            name: named.function.name,
        }),
    })
}

/// Convert OpenAI messages to Anthropic format.
/// Returns (system_prompt, messages).
pub fn convert_messages(openai_messages: Vec<Message>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages = Vec::new();
    let mut pending_tool_results: Vec<ContentBlock> = Vec::new();

    for msg in openai_messages {
        match msg {
            Message::System { content, .. } | Message::Developer { content, .. } => {
                let text = extract_text(&content);
                if !text.is_empty() {
                    system_parts.push(text);
                }
            }
            Message::User { content, .. } => {
                // If we have pending tool results, add them as a user message first
                if !pending_tool_results.is_empty() {
                    messages.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: AnthropicContent::Blocks(std::mem::take(
                            &mut pending_tool_results,
                        )),
                    });
                }
                // Use content blocks to support images and other multimodal content
                let blocks = convert_content_to_blocks(&content);
                if !blocks.is_empty() {
                    messages.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                // If we have pending tool results, add them as a user message first
                if !pending_tool_results.is_empty() {
                    messages.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: AnthropicContent::Blocks(std::mem::take(
                            &mut pending_tool_results,
                        )),
                    });
                }

                let mut blocks = Vec::new();

                // Add text content if present
                if let Some(content) = content {
                    let text = extract_text(&content);
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text,
                            cache_control: None,
                        });
                    }
                }

                // Add tool use blocks if present
                if let Some(tool_calls) = tool_calls {
                    for tool_call in tool_calls {
                        // Parse the JSON arguments string into a Value
                        let input = serde_json::from_str(&tool_call.function.arguments)
                            .unwrap_or(serde_json::json!({}));
                        blocks.push(ContentBlock::ToolUse {
                            id: tool_call.id,
                            name: tool_call.function.name,
                            input,
                            cache_control: None,
                        });
                    }
                }

                if !blocks.is_empty() {
                    messages.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
            }
            Message::Tool {
                content,
                tool_call_id,
            } => {
                // Collect tool results to be added as a user message
                pending_tool_results.push(ContentBlock::ToolResult {
                    tool_use_id: tool_call_id,
                    content: extract_text(&content),
                    cache_control: None,
                });
            }
        }
    }

    // Add any remaining tool results as a final user message
    if !pending_tool_results.is_empty() {
        messages.push(AnthropicMessage {
            role: "user".to_string(),
            content: AnthropicContent::Blocks(pending_tool_results),
        });
    }

    // Concatenate all system/developer messages with double newlines
    let system_prompt = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system_prompt, messages)
}

/// Convert stop sequences from OpenAI format
pub fn convert_stop(stop: Option<Stop>) -> Option<Vec<String>> {
    stop.map(|s| match s {
        Stop::Single(s) => vec![s],
        Stop::Multiple(v) => v,
    })
}

/// Convert Anthropic response to OpenAI format.
pub fn convert_response(anthropic: AnthropicResponse) -> OpenAIResponse {
    let mut text_content = Vec::new();
    let mut thinking_content = Vec::new();
    let mut tool_calls = Vec::new();

    for block in anthropic.content {
        match block {
            ContentBlock::Text { text, .. } => {
                text_content.push(text);
            }
            ContentBlock::Thinking { thinking, .. } => {
                // Extract thinking content for reasoning field
                thinking_content.push(thinking);
            }
            ContentBlock::ToolUse {
                id, name, input, ..
            } => {
                tool_calls.push(OpenAIToolCall {
                    id,
                    type_: "function".to_string(),
                    function: OpenAIToolCallFunction {
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_default(),
                    },
                });
            }
            _ => {}
        }
    }

    let content = text_content.join("");
    let reasoning = thinking_content.join("");

    let finish_reason = match anthropic.stop_reason.as_deref() {
        Some("end_turn") => Some("stop".to_string()),
        Some("max_tokens") => Some("length".to_string()),
        Some("stop_sequence") => Some("stop".to_string()),
        Some("tool_use") => Some("tool_calls".to_string()),
        Some("pause_turn") => Some("stop".to_string()),
        Some("refusal") => Some("stop".to_string()),
        other => other.map(String::from),
    };

    OpenAIResponse {
        id: anthropic.id,
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: anthropic.model,
        choices: vec![OpenAIChoice {
            index: 0,
            message: OpenAIMessage {
                role: "assistant".to_string(),
                content: if content.is_empty() {
                    None
                } else {
                    Some(content)
                },
                refusal: None,
                reasoning: if reasoning.is_empty() {
                    None
                } else {
                    Some(reasoning)
                },
                name: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            },
            finish_reason,
            logprobs: None,
        }],
        usage: Some(OpenAIUsage {
            prompt_tokens: anthropic.usage.input_tokens,
            completion_tokens: anthropic.usage.output_tokens,
            total_tokens: anthropic.usage.input_tokens + anthropic.usage.output_tokens,
            prompt_tokens_details: if anthropic.usage.cache_read_input_tokens > 0
                || anthropic.usage.cache_creation_input_tokens > 0
            {
                Some(PromptTokensDetails {
                    cached_tokens: anthropic.usage.cache_read_input_tokens,
                    cache_creation_input_tokens: anthropic.usage.cache_creation_input_tokens,
                })
            } else {
                None
            },
        }),
        system_fingerprint: None,
    }
}

// ============================================================================
// Responses API Conversion Functions
// ============================================================================

/// Convert OpenAI Responses API input to Anthropic Messages format.
/// Returns (system_prompt, messages).
pub fn convert_responses_input_to_messages(
    input: Option<ResponsesInput>,
    instructions: Option<String>,
) -> (Option<String>, Vec<AnthropicMessage>) {
    let system = instructions;
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    let Some(input) = input else {
        return (system, messages);
    };

    match input {
        ResponsesInput::Text(text) => {
            // Simple text input becomes a single user message
            messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: AnthropicContent::Text(text),
            });
        }
        ResponsesInput::Items(items) => {
            // Collect tool results to batch into user messages
            let mut pending_tool_results: Vec<ContentBlock> = Vec::new();

            for item in items {
                match item {
                    ResponsesInputItem::EasyMessage(msg) => {
                        // Flush pending tool results before adding new message
                        if !pending_tool_results.is_empty() {
                            messages.push(AnthropicMessage {
                                role: "user".to_string(),
                                content: AnthropicContent::Blocks(std::mem::take(
                                    &mut pending_tool_results,
                                )),
                            });
                        }

                        let role = match msg.role {
                            EasyInputMessageRole::User => "user",
                            EasyInputMessageRole::Assistant => "assistant",
                            EasyInputMessageRole::System | EasyInputMessageRole::Developer => {
                                // System/developer messages are typically handled via instructions
                                // but if they appear in input, we skip them (already in system)
                                continue;
                            }
                        };

                        let content = match msg.content {
                            EasyInputMessageContent::Text(text) => AnthropicContent::Text(text),
                            EasyInputMessageContent::Parts(parts) => {
                                let blocks = convert_responses_content_to_blocks(&parts);
                                AnthropicContent::Blocks(blocks)
                            }
                        };

                        messages.push(AnthropicMessage {
                            role: role.to_string(),
                            content,
                        });
                    }
                    ResponsesInputItem::MessageItem(msg) => {
                        // Flush pending tool results
                        if !pending_tool_results.is_empty() {
                            messages.push(AnthropicMessage {
                                role: "user".to_string(),
                                content: AnthropicContent::Blocks(std::mem::take(
                                    &mut pending_tool_results,
                                )),
                            });
                        }

                        let role = match msg.role {
                            InputMessageItemRole::User => "user",
                            InputMessageItemRole::System | InputMessageItemRole::Developer => {
                                continue;
                            }
                        };

                        let blocks = convert_responses_content_to_blocks(&msg.content);
                        messages.push(AnthropicMessage {
                            role: role.to_string(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                    ResponsesInputItem::OutputMessage(msg) => {
                        // Flush pending tool results
                        if !pending_tool_results.is_empty() {
                            messages.push(AnthropicMessage {
                                role: "user".to_string(),
                                content: AnthropicContent::Blocks(std::mem::take(
                                    &mut pending_tool_results,
                                )),
                            });
                        }

                        // Output message from assistant - convert content items to blocks
                        let mut blocks = Vec::new();
                        for content_item in msg.content {
                            match content_item {
                                OutputMessageContentItem::OutputText { text, .. } => {
                                    blocks.push(ContentBlock::Text {
                                        text,
                                        cache_control: None,
                                    });
                                }
                                OutputMessageContentItem::Refusal { refusal } => {
                                    // Convert refusal to text block
                                    blocks.push(ContentBlock::Text {
                                        text: refusal,
                                        cache_control: None,
                                    });
                                }
                            }
                        }

                        if !blocks.is_empty() {
                            messages.push(AnthropicMessage {
                                role: "assistant".to_string(),
                                content: AnthropicContent::Blocks(blocks),
                            });
                        }
                    }
                    ResponsesInputItem::FunctionCall(call) => {
                        // Flush pending tool results
                        if !pending_tool_results.is_empty() {
                            messages.push(AnthropicMessage {
                                role: "user".to_string(),
                                content: AnthropicContent::Blocks(std::mem::take(
                                    &mut pending_tool_results,
                                )),
                            });
                        }

                        // Function call from assistant
                        let input: serde_json::Value =
                            serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({}));
                        let call_id = crate::providers::normalize_tool_call_id(&call.call_id);
                        messages.push(AnthropicMessage {
                            role: "assistant".to_string(),
                            content: AnthropicContent::Blocks(vec![ContentBlock::ToolUse {
                                id: call_id,
                                name: call.name.clone(),
                                input,
                                cache_control: None,
                            }]),
                        });
                    }
                    ResponsesInputItem::OutputFunctionCall(call) => {
                        // Flush pending tool results
                        if !pending_tool_results.is_empty() {
                            messages.push(AnthropicMessage {
                                role: "user".to_string(),
                                content: AnthropicContent::Blocks(std::mem::take(
                                    &mut pending_tool_results,
                                )),
                            });
                        }

                        // Output function call from assistant
                        let input: serde_json::Value =
                            serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({}));
                        let call_id = crate::providers::normalize_tool_call_id(&call.call_id);
                        messages.push(AnthropicMessage {
                            role: "assistant".to_string(),
                            content: AnthropicContent::Blocks(vec![ContentBlock::ToolUse {
                                id: call_id,
                                name: call.name.clone(),
                                input,
                                cache_control: None,
                            }]),
                        });
                    }
                    ResponsesInputItem::FunctionCallOutput(output) => {
                        // Collect tool results to batch into a user message
                        let call_id = crate::providers::normalize_tool_call_id(&output.call_id);
                        pending_tool_results.push(ContentBlock::ToolResult {
                            tool_use_id: call_id,
                            content: output.output,
                            cache_control: None,
                        });
                    }
                    ResponsesInputItem::Reasoning(_) => {
                        // Reasoning blocks from previous responses are typically not sent back
                        // to the model (they're for client observation). Skip them.
                    }
                    ResponsesInputItem::WebSearchCall(_)
                    | ResponsesInputItem::FileSearchCall(_)
                    | ResponsesInputItem::ImageGeneration(_) => {
                        // These are server-side tool calls that don't need translation
                        // to Anthropic format - they're OpenAI-specific features
                    }
                }
            }

            // Flush any remaining tool results
            if !pending_tool_results.is_empty() {
                messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: AnthropicContent::Blocks(pending_tool_results),
                });
            }
        }
    }

    (system, messages)
}

/// Convert Responses API content items to Anthropic content blocks.
pub fn convert_responses_content_to_blocks(
    items: &[ResponseInputContentItem],
) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    for item in items {
        match item {
            ResponseInputContentItem::InputText {
                text,
                cache_control,
            } => {
                if !text.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: text.clone(),
                        cache_control: convert_cache_control(cache_control.as_ref()),
                    });
                }
            }
            ResponseInputContentItem::InputImage {
                image_url,
                detail,
                cache_control,
            } => {
                if let Some(url) = image_url {
                    let cc = convert_cache_control(cache_control.as_ref());
                    // Check if it's an HTTPS URL - Anthropic supports direct URL references
                    if url.starts_with("https://") {
                        blocks.push(ContentBlock::Image {
                            source: ImageSource::Url { url: url.clone() },
                            cache_control: cc,
                        });
                    } else if url.starts_with("http://") {
                        // Anthropic only supports HTTPS URLs, not HTTP
                        tracing::warn!(
                            url = %url,
                            detail = ?detail,
                            "Anthropic only supports HTTPS image URLs, not HTTP. Image skipped."
                        );
                    } else {
                        // Try to parse as data URL (base64)
                        match parse_data_url(url) {
                            Ok(image_data) => {
                                blocks.push(ContentBlock::Image {
                                    source: ImageSource::Base64 {
                                        media_type: image_data.media_type,
                                        data: image_data.data,
                                    },
                                    cache_control: cc,
                                });
                            }
                            Err(e) => {
                                tracing::warn!(
                                    url = %url,
                                    detail = ?detail,
                                    error = %e,
                                    "Failed to parse image data URL. Image skipped."
                                );
                            }
                        }
                    }
                }
            }
            ResponseInputContentItem::InputFile { .. } => {
                // File inputs not directly supported by Anthropic Messages API
                tracing::warn!("File inputs not supported by Anthropic Messages API");
            }
            ResponseInputContentItem::InputAudio { .. } => {
                // Audio inputs not directly supported by Anthropic Messages API
                tracing::warn!("Audio inputs not supported by Anthropic Messages API");
            }
        }
    }

    blocks
}

/// Convert Responses API tools to Anthropic tools format.
pub fn convert_responses_tools(
    tools: Option<Vec<ResponsesToolDefinition>>,
) -> Option<Vec<AnthropicTool>> {
    let tools = tools?;
    let mut anthropic_tools = Vec::new();

    for tool in tools {
        match tool {
            ResponsesToolDefinition::Function(value) => {
                // Extract function tool definition from generic JSON
                // Expected format: { "type": "function", "name": "...", "description": "...", "parameters": {...}, "cache_control": {...} }
                if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
                    let description = value
                        .get("description")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    let parameters = value
                        .get("parameters")
                        .cloned()
                        .unwrap_or(serde_json::json!({"type": "object", "properties": {}}));

                    // Extract cache_control from JSON if present
                    let cache_control = value
                        .get("cache_control")
                        .and_then(|v| serde_json::from_value::<CacheControl>(v.clone()).ok())
                        .as_ref()
                        .and_then(|cc| convert_cache_control(Some(cc)));

                    anthropic_tools.push(AnthropicTool {
                        name: name.to_string(),
                        description,
                        input_schema: parameters,
                        cache_control,
                    });
                }
            }
            ResponsesToolDefinition::WebSearchPreview(_)
            | ResponsesToolDefinition::WebSearchPreview20250311(_)
            | ResponsesToolDefinition::WebSearch(_)
            | ResponsesToolDefinition::WebSearch20250826(_) => {
                // Web search tools are OpenAI-specific, not supported by Anthropic
                tracing::warn!("Web search tools not supported by Anthropic Messages API");
            }
            ResponsesToolDefinition::FileSearch(file_search) => {
                // File search is handled by the gateway middleware, but the model needs to know
                // how to call it. Convert to a function tool so the model can generate proper
                // tool calls that the middleware will intercept and execute.
                anthropic_tools.push(AnthropicTool {
                    name: FileSearchToolArguments::FUNCTION_NAME.to_string(),
                    description: Some(FileSearchToolArguments::function_description().to_string()),
                    input_schema: FileSearchToolArguments::function_parameters_schema(),
                    cache_control: convert_cache_control(file_search.cache_control.as_ref()),
                });
                tracing::debug!("Converted file_search tool to function definition for model");
            }
        }
    }

    if anthropic_tools.is_empty() {
        None
    } else {
        Some(anthropic_tools)
    }
}

/// Convert Responses API tool choice to Anthropic tool choice format.
pub fn convert_responses_tool_choice(
    tool_choice: Option<ResponsesToolChoice>,
) -> Option<AnthropicToolChoice> {
    tool_choice.and_then(|tc| match tc {
        ResponsesToolChoice::String(default) => match default {
            ResponsesToolChoiceDefault::Auto => Some(AnthropicToolChoice::Auto),
            ResponsesToolChoiceDefault::Required => Some(AnthropicToolChoice::Any),
            ResponsesToolChoiceDefault::None => None,
        },
        ResponsesToolChoice::Named(named) => Some(AnthropicToolChoice::Tool { name: named.name }),
        ResponsesToolChoice::WebSearch(_) => {
            // Web search tool choice not supported by Anthropic
            tracing::warn!("Web search tool choice not supported by Anthropic");
            None
        }
    })
}

/// Convert Responses API reasoning config to Anthropic thinking config.
/// Check if a model supports adaptive thinking (Opus 4.6+).
pub(super) fn supports_adaptive_thinking(model: &str) -> bool {
    model.contains("opus-4-6") || model.contains("opus-4.6")
}

pub fn convert_reasoning_config(
    reasoning: Option<&ResponsesReasoningConfig>,
    model: &str,
) -> (
    Option<AnthropicThinkingConfig>,
    Option<AnthropicOutputConfig>,
) {
    let Some(reasoning) = reasoning else {
        return (None, None);
    };

    // Check if reasoning is explicitly disabled
    if reasoning.enabled == Some(false) {
        return (Some(AnthropicThinkingConfig::Disabled), None);
    }

    // If enabled or effort is specified
    if reasoning.enabled == Some(true)
        || reasoning.effort.is_some()
        || reasoning.max_tokens.is_some()
    {
        // For adaptive-capable models, use adaptive thinking with effort-based output config
        if supports_adaptive_thinking(model) && reasoning.max_tokens.is_none() {
            let effort = match reasoning.effort {
                Some(ResponsesReasoningEffort::None) => {
                    return (Some(AnthropicThinkingConfig::Disabled), None);
                }
                Some(ResponsesReasoningEffort::Minimal) | Some(ResponsesReasoningEffort::Low) => {
                    AnthropicEffort::Low
                }
                Some(ResponsesReasoningEffort::Medium) | None => AnthropicEffort::Medium,
                Some(ResponsesReasoningEffort::High) => AnthropicEffort::High,
            };
            return (
                Some(AnthropicThinkingConfig::Adaptive),
                Some(AnthropicOutputConfig { effort }),
            );
        }

        // Non-adaptive models: use fixed budget tokens
        let budget_tokens = if let Some(max) = reasoning.max_tokens {
            max as u32
        } else {
            match reasoning.effort {
                Some(ResponsesReasoningEffort::High) => 32000,
                Some(ResponsesReasoningEffort::Medium) => 16000,
                Some(ResponsesReasoningEffort::Low) => 8000,
                Some(ResponsesReasoningEffort::Minimal) => 2048,
                Some(ResponsesReasoningEffort::None) => {
                    return (Some(AnthropicThinkingConfig::Disabled), None);
                }
                None => 10000,
            }
        };

        // Minimum budget is 1024 tokens per Anthropic API requirements
        let budget_tokens = budget_tokens.max(1024);

        return (
            Some(AnthropicThinkingConfig::Enabled { budget_tokens }),
            None,
        );
    }

    (None, None)
}

/// Convert Chat Completion API reasoning config to Anthropic thinking config.
///
/// This is similar to `convert_reasoning_config` but works with the simpler
/// `CreateChatCompletionReasoning` type from the Chat Completion API.
pub fn convert_chat_completion_reasoning_config(
    reasoning: Option<&CreateChatCompletionReasoning>,
    model: &str,
) -> (
    Option<AnthropicThinkingConfig>,
    Option<AnthropicOutputConfig>,
) {
    let Some(reasoning) = reasoning else {
        return (None, None);
    };

    if let Some(effort) = reasoning.effort {
        // For adaptive-capable models, use adaptive thinking with effort-based output config
        if supports_adaptive_thinking(model) {
            let anthropic_effort = match effort {
                ReasoningEffort::None => {
                    return (Some(AnthropicThinkingConfig::Disabled), None);
                }
                ReasoningEffort::Minimal | ReasoningEffort::Low => AnthropicEffort::Low,
                ReasoningEffort::Medium => AnthropicEffort::Medium,
                ReasoningEffort::High => AnthropicEffort::High,
            };
            return (
                Some(AnthropicThinkingConfig::Adaptive),
                Some(AnthropicOutputConfig {
                    effort: anthropic_effort,
                }),
            );
        }

        // Non-adaptive models: use fixed budget tokens
        let budget_tokens = match effort {
            ReasoningEffort::High => 32000,
            ReasoningEffort::Medium => 16000,
            ReasoningEffort::Low => 8000,
            ReasoningEffort::Minimal => 2048,
            ReasoningEffort::None => {
                return (Some(AnthropicThinkingConfig::Disabled), None);
            }
        };

        // Minimum budget is 1024 tokens per Anthropic API requirements
        let budget_tokens = budget_tokens.max(1024);

        return (
            Some(AnthropicThinkingConfig::Enabled { budget_tokens }),
            None,
        );
    }

    (None, None)
}

/// Convert Anthropic response to OpenAI Responses API format.
pub fn convert_anthropic_to_responses_response(
    anthropic: AnthropicResponse,
    reasoning_config: Option<&ResponsesReasoningConfig>,
    user: Option<String>,
) -> CreateResponsesResponse {
    let mut output: Vec<ResponsesOutputItem> = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();
    let mut thinking_text: Option<String> = None;
    let mut thinking_signature: Option<String> = None;

    // Process content blocks
    for block in &anthropic.content {
        match block {
            ContentBlock::Text { text, .. } => {
                text_parts.push(text.clone());
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                thinking_text = Some(thinking.clone());
                thinking_signature = signature.clone();
            }
            ContentBlock::ToolUse {
                id, name, input, ..
            } => {
                output.push(ResponsesOutputItem::FunctionCall(OutputItemFunctionCall {
                    type_: OutputItemFunctionCallType::FunctionCall,
                    id: Some(id.clone()),
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_default(),
                    call_id: id.clone(),
                    status: Some(OutputItemFunctionCallStatus::Completed),
                }));
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {
                // Images and tool results in response are unusual, skip them
            }
        }
    }

    // Add reasoning output if thinking was present
    if let Some(thinking) = thinking_text {
        output.push(ResponsesOutputItem::Reasoning(ResponsesReasoning {
            type_: ResponsesReasoningType::Reasoning,
            id: format!(
                "rs_{}",
                &anthropic.id[4..].chars().take(24).collect::<String>()
            ),
            content: None,   // Anthropic doesn't provide structured reasoning content
            summary: vec![], // Would need to generate summary
            encrypted_content: None,
            status: None,
            signature: thinking_signature,
            format: Some(
                crate::api_types::responses::OpenResponsesReasoningFormat::AnthropicClaudeV1,
            ),
        }));

        // Store the thinking text - in Responses API the thinking is typically not in output_text
        // but we could optionally include it
        let _ = thinking; // Unused for now
    }

    // Create output message with text content
    let output_text = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join(""))
    };

    // Add the message output
    let message_content: Vec<OutputMessageContentItem> = if let Some(ref text) = output_text {
        vec![OutputMessageContentItem::OutputText {
            text: text.clone(),
            annotations: vec![],
            logprobs: vec![],
        }]
    } else {
        vec![]
    };

    // Only add message if there's content or no function calls
    if !message_content.is_empty() || output.is_empty() {
        output.insert(
            0,
            ResponsesOutputItem::Message(OutputMessage {
                id: format!(
                    "msg_{}",
                    &anthropic.id[4..].chars().take(24).collect::<String>()
                ),
                type_: MessageType::Message,
                role: "assistant".to_string(),
                content: message_content,
                status: Some(OutputMessageStatus::Completed),
            }),
        );
    }

    // Determine status based on stop_reason
    let status = match anthropic.stop_reason.as_deref() {
        Some("end_turn") => ResponsesResponseStatus::Completed,
        Some("max_tokens") => ResponsesResponseStatus::Incomplete,
        Some("stop_sequence") => ResponsesResponseStatus::Completed,
        Some("tool_use") => ResponsesResponseStatus::Completed,
        Some("pause_turn") => ResponsesResponseStatus::Completed,
        Some("refusal") => ResponsesResponseStatus::Completed,
        _ => ResponsesResponseStatus::Completed,
    };

    // Build reasoning config output if reasoning was requested
    let reasoning_output = reasoning_config.map(|config| ResponsesReasoningConfigOutput {
        effort: config.effort,
        summary: config.summary,
    });

    CreateResponsesResponse {
        id: anthropic.id.clone(),
        object: ResponseType::Response,
        created_at: chrono::Utc::now().timestamp() as f64,
        model: anthropic.model.clone(),
        status: Some(status),
        output,
        user,
        output_text,
        prompt_cache_key: None,
        safety_identifier: None,
        error: None,
        incomplete_details: None,
        usage: Some(ResponsesUsage {
            input_tokens: anthropic.usage.input_tokens,
            input_tokens_details: ResponsesUsageInputTokensDetails {
                cached_tokens: anthropic.usage.cache_read_input_tokens,
            },
            output_tokens: anthropic.usage.output_tokens,
            output_tokens_details: ResponsesUsageOutputTokensDetails {
                reasoning_tokens: 0, // Anthropic doesn't report this separately
            },
            total_tokens: anthropic.usage.input_tokens + anthropic.usage.output_tokens,
            cost: None,
            is_byok: None,
            cost_details: None,
        }),
        max_tool_calls: None,
        top_logprobs: None,
        max_output_tokens: None,
        temperature: None,
        top_p: None,
        instructions: None,
        metadata: None,
        tools: None,
        tool_choice: None,
        parallel_tool_calls: None,
        prompt: None,
        background: None,
        previous_response_id: None,
        reasoning: reasoning_output,
        service_tier: None,
        store: None,
        truncation: None,
        text: None,
    }
}
