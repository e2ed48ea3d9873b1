//! Provider-neutral chat types for the LLM driver port.
//!
//! The agent's step loop speaks these types; the concrete provider adapter
//! translates them to its SDK. Tool parameters are JSON Schema values and
//! tool-call arguments stay raw JSON strings until the bridge parses them.

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// A tool the model may call: name, human description, JSON Schema params.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call emitted by the model. `arguments` is the raw JSON string the
/// provider returned; validation happens at the tool bridge.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One assistant turn: free text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}
