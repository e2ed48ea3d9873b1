//! OpenAI-compatible chat driver.
//!
//! Translates the provider-neutral chat types into `async-openai` requests.
//! Any endpoint speaking the chat-completions dialect works through the
//! configurable base URL.

use crate::config::LlmEnvConfig;
use crate::domain::llm::{ChatMessage, ChatTurn, ToolCallRequest, ToolSpec};
use crate::domain::ports::ChatCompleter;
use anyhow::{Context, Result};
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionToolArgs, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObjectArgs,
};
use async_trait::async_trait;
use tracing::debug;

pub struct OpenAiDriver {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiDriver {
    pub fn new(config: &LlmEnvConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(config.api_key.clone());
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url.clone());
        }
        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        }
    }

    fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let request_message = match message {
            ChatMessage::System { content } => ChatCompletionRequestSystemMessageArgs::default()
                .content(content.as_str())
                .build()?
                .into(),
            ChatMessage::User { content } => ChatCompletionRequestUserMessageArgs::default()
                .content(content.as_str())
                .build()?
                .into(),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if let Some(content) = content {
                    builder.content(content.as_str());
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<ChatCompletionMessageToolCall> = tool_calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build()?.into()
            }
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(tool_call_id.clone())
                .content(content.as_str())
                .build()?
                .into(),
        };
        Ok(request_message)
    }
}

#[async_trait]
impl ChatCompleter for OpenAiDriver {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatTurn> {
        let request_messages: Vec<ChatCompletionRequestMessage> = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<Result<_>>()?;

        let request_tools = tools
            .iter()
            .map(|tool| {
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name.clone())
                            .description(tool.description.clone())
                            .parameters(tool.parameters.clone())
                            .build()?,
                    )
                    .build()
                    .context("Failed to build tool definition")
            })
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(request_messages)
            .tools(request_tools)
            .build()
            .context("Failed to build chat request")?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Chat completion request failed")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .context("Chat completion returned no choices")?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect::<Vec<_>>();

        debug!(
            "OpenAiDriver: turn produced {} tool call(s)",
            tool_calls.len()
        );

        Ok(ChatTurn {
            content: choice.message.content,
            tool_calls,
        })
    }
}
