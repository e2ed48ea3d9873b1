//! The trading agent: one LLM-driven decision pass per symbol.
//!
//! `process_symbol` runs a bounded tool-call loop against the LLM driver
//! and always produces exactly one audit record, whether the pass finished
//! cleanly, hit the step cap, or failed on a provider error.

pub mod prompts;
pub mod tools;

use crate::application::audit::AuditSink;
use crate::domain::llm::{ChatMessage, ToolCallRequest};
use crate::domain::ports::ChatCompleter;
use crate::domain::risk::guard::RiskGuard;
use crate::domain::trading::session::{ToolCallLog, TradeOperation, TradeRecord, TradingSession};
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tools::{TOOL_PLACE_ORDER, ToolInvocation, ToolSet, tool_specs};
use tracing::{error, info, instrument, warn};

/// Hard cap on LLM steps per symbol; bounds cycle latency.
const MAX_STEPS: usize = 15;
const INTER_SYMBOL_PAUSE: Duration = Duration::from_millis(1000);

pub struct TradingAgent {
    completer: Arc<dyn ChatCompleter>,
    toolset: Arc<ToolSet>,
    risk_guard: Arc<RiskGuard>,
    audit: Arc<AuditSink>,
}

struct SymbolOutcome {
    reasoning: String,
    tool_calls: Vec<ToolCallLog>,
    trades: Vec<TradeRecord>,
}

impl TradingAgent {
    pub fn new(
        completer: Arc<dyn ChatCompleter>,
        toolset: Arc<ToolSet>,
        risk_guard: Arc<RiskGuard>,
        audit: Arc<AuditSink>,
    ) -> Self {
        Self {
            completer,
            toolset,
            risk_guard,
            audit,
        }
    }

    /// Processes every symbol in order, pausing between instruments so the
    /// venue and the provider get breathing room.
    pub async fn run(&self, symbols: &[String]) -> Result<()> {
        for (index, symbol) in symbols.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(INTER_SYMBOL_PAUSE).await;
            }
            self.process_symbol(symbol).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn process_symbol(&self, symbol: &str) {
        let start_time = Utc::now();
        let user_prompt = prompts::render_user_prompt(symbol);

        let session = match self.drive_llm(symbol, &user_prompt).await {
            Ok(outcome) => {
                info!(
                    "Agent: {} finished with {} tool calls",
                    symbol,
                    outcome.tool_calls.len()
                );
                TradingSession {
                    symbol: symbol.to_string(),
                    start_time,
                    end_time: Utc::now(),
                    prompt: user_prompt,
                    reasoning: outcome.reasoning,
                    tool_calls: outcome.tool_calls,
                    success: true,
                    error: None,
                    trades: outcome.trades,
                }
            }
            Err(e) => {
                error!("Agent: {} failed: {:#}", symbol, e);
                TradingSession {
                    symbol: symbol.to_string(),
                    start_time,
                    end_time: Utc::now(),
                    prompt: user_prompt,
                    reasoning: String::new(),
                    tool_calls: vec![],
                    success: false,
                    error: Some(format!("{:#}", e)),
                    trades: vec![],
                }
            }
        };

        self.audit.record(&session).await;
    }

    async fn drive_llm(&self, symbol: &str, user_prompt: &str) -> Result<SymbolOutcome> {
        let specs = tool_specs();
        let mut messages = vec![
            ChatMessage::System {
                content: prompts::render_system_prompt(&self.risk_guard),
            },
            ChatMessage::User {
                content: user_prompt.to_string(),
            },
        ];

        let mut tool_calls = Vec::new();
        let mut trades = Vec::new();
        let mut reasoning = String::new();

        for step in 0..MAX_STEPS {
            let turn = self
                .completer
                .complete(&messages, &specs)
                .await
                .with_context(|| format!("LLM step {} failed for {}", step + 1, symbol))?;

            if let Some(content) = &turn.content
                && !content.is_empty()
            {
                reasoning = content.clone();
            }

            if turn.tool_calls.is_empty() {
                return Ok(SymbolOutcome {
                    reasoning,
                    tool_calls,
                    trades,
                });
            }

            messages.push(ChatMessage::Assistant {
                content: turn.content.clone(),
                tool_calls: turn.tool_calls.clone(),
            });

            for call in &turn.tool_calls {
                let result = self.execute_tool(call).await;
                if call.name == TOOL_PLACE_ORDER
                    && let Some(trade) = trade_record(&call.arguments, &result)
                {
                    trades.push(trade);
                }

                tool_calls.push(ToolCallLog {
                    tool: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments)
                        .unwrap_or(Value::String(call.arguments.clone())),
                    result: result.clone(),
                });

                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: result.to_string(),
                });
            }
        }

        warn!("Agent: {} hit the {}-step cap", symbol, MAX_STEPS);
        Ok(SymbolOutcome {
            reasoning: if reasoning.is_empty() {
                format!("Stopped after {} steps without a final answer", MAX_STEPS)
            } else {
                reasoning
            },
            tool_calls,
            trades,
        })
    }

    async fn execute_tool(&self, call: &ToolCallRequest) -> Value {
        match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(invocation) => self.toolset.execute(invocation).await,
            Err(error) => {
                warn!("Agent: rejected tool call {}: {}", call.name, error);
                serde_json::json!({ "success": false, "error": error })
            }
        }
    }
}

/// Builds the audit trade record for a successful `place_order` call. Failed
/// or rejected orders still appear in the tool-call log.
fn trade_record(arguments: &str, result: &Value) -> Option<TradeRecord> {
    if result.get("success") != Some(&Value::Bool(true)) {
        return None;
    }
    let args: Value = serde_json::from_str(arguments).ok()?;
    let action = args.get("action")?.as_str()?;

    Some(TradeRecord {
        symbol: args.get("symbol")?.as_str()?.to_string(),
        operation: TradeOperation::from_action(action),
        leverage: args
            .get("leverage")
            .and_then(Value::as_u64)
            .map(|l| l as u32),
        amount: decimal_field(&args, "cost"),
        pricing: decimal_field(&args, "price"),
        stop_loss: decimal_field(&args, "stop_loss"),
        take_profit: decimal_field(&args, "take_profit"),
    })
}

fn decimal_field(args: &Value, key: &str) -> Option<Decimal> {
    args.get(key)
        .and_then(Value::as_f64)
        .and_then(Decimal::from_f64_retain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trade_record_from_successful_order() {
        let record = trade_record(
            r#"{"symbol":"BTC/USDT","action":"open_long","cost":100,"leverage":5,"stop_loss":95000}"#,
            &json!({ "success": true, "orderId": "1" }),
        )
        .unwrap();
        assert_eq!(record.operation, TradeOperation::Buy);
        assert_eq!(record.leverage, Some(5));
        assert!(record.stop_loss.is_some());
    }

    #[test]
    fn test_no_trade_record_for_failed_order() {
        let record = trade_record(
            r#"{"symbol":"BTC/USDT","action":"open_long","cost":100,"leverage":5}"#,
            &json!({ "success": false, "error": "rejected" }),
        );
        assert!(record.is_none());
    }
}
