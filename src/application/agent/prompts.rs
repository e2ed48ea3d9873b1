//! Prompt rendering for the trading agent.
//!
//! The system prompt is derived from the risk guard so the model is told
//! exactly the constraints the validator will enforce; drift between the
//! two would only waste tool calls on rejections.

use crate::domain::risk::guard::RiskGuard;

pub fn render_system_prompt(risk_guard: &RiskGuard) -> String {
    let mut whitelist: Vec<&str> = risk_guard.whitelist().iter().map(String::as_str).collect();
    whitelist.sort_unstable();

    format!(
        "You are an autonomous cryptocurrency futures trading agent operating in {mode} mode.\n\
         \n\
         You analyze one instrument at a time and decide whether to open a long, open a short, \
         close an existing position, or hold. You act exclusively through the provided tools; \
         never assume an order happened unless a tool call confirmed it.\n\
         \n\
         Hard constraints enforced by the risk engine:\n\
         - Tradable symbols: {whitelist}\n\
         - Leverage: between 1x and {max_leverage}x\n\
         - Maximum margin per trade: {max_cost} USDT\n\
         - At most one open position per symbol\n\
         \n\
         Guidelines:\n\
         - Always inspect market data and account state before trading.\n\
         - When opening a position, attach a stop-loss (around {sl_pct:.0}% adverse move) and \
           consider a take-profit (around {tp_pct:.0}% favorable move).\n\
         - Closing actions must not attach protective prices.\n\
         - If conditions are unclear, holding is a valid decision; explain it.\n\
         \n\
         Finish with a short summary of your reasoning and the action you took.",
        mode = risk_guard.mode(),
        whitelist = whitelist.join(", "),
        max_leverage = risk_guard.max_leverage(),
        max_cost = risk_guard.max_cost_per_trade(),
        sl_pct = risk_guard.default_stop_loss_percent() * 100.0,
        tp_pct = risk_guard.default_take_profit_percent() * 100.0,
    )
}

pub fn render_user_prompt(symbol: &str) -> String {
    format!(
        "Run one trading cycle for {symbol}.\n\
         1. Fetch current market data for {symbol}.\n\
         2. Fetch account info including any open position on {symbol}.\n\
         3. Decide: open long, open short, close, or hold.\n\
         4. If you trade, place the order and verify the result.\n\
         Report your final decision and reasoning."
    )
}
