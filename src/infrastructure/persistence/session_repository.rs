//! Relational audit target.
//!
//! Writes one parent row per session plus one child row per executed
//! trade. The trade symbol column is a closed five-ticker enum; sessions
//! on symbols outside it still get their parent row, the trade rows are
//! skipped with a warning.

use crate::domain::ports::SessionRepository;
use crate::domain::trading::session::{TradeRecord, TradingSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// The closed symbol set of the relational schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSymbol {
    Btc,
    Eth,
    Bnb,
    Sol,
    Doge,
}

impl AuditSymbol {
    /// Maps a normalized pair (`BTC/USDT`) or bare ticker to the enum.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let base = symbol.split('/').next().unwrap_or(symbol).trim();
        match base.to_ascii_uppercase().as_str() {
            "BTC" => Some(AuditSymbol::Btc),
            "ETH" => Some(AuditSymbol::Eth),
            "BNB" => Some(AuditSymbol::Bnb),
            "SOL" => Some(AuditSymbol::Sol),
            "DOGE" => Some(AuditSymbol::Doge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSymbol::Btc => "BTC",
            AuditSymbol::Eth => "ETH",
            AuditSymbol::Bnb => "BNB",
            AuditSymbol::Sol => "SOL",
            AuditSymbol::Doge => "DOGE",
        }
    }
}

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_trade(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        session_id: &str,
        trade: &TradeRecord,
    ) -> Result<bool> {
        let Some(symbol) = AuditSymbol::from_symbol(&trade.symbol) else {
            warn!(
                "SessionRepository: symbol {} is outside the audit enum, skipping trade row",
                trade.symbol
            );
            return Ok(false);
        };

        sqlx::query(
            r#"
            INSERT INTO trades
                (session_id, symbol, operation, leverage, amount, pricing, stop_loss, take_profit)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(symbol.as_str())
        .bind(trade.operation.to_string())
        .bind(trade.leverage.map(|l| l as i64))
        .bind(trade.amount.map(|a| a.to_string()))
        .bind(trade.pricing.map(|p| p.to_string()))
        .bind(trade.stop_loss.map(|s| s.to_string()))
        .bind(trade.take_profit.map(|t| t.to_string()))
        .execute(&mut **tx)
        .await
        .context("Failed to insert trade row")?;

        Ok(true)
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn save(&self, session: &TradingSession) -> Result<()> {
        let session_id = Uuid::new_v4().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open transaction")?;

        sqlx::query(
            r#"
            INSERT INTO reasoning_sessions
                (id, symbol, prompt, reasoning, start_time, end_time, success, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session_id)
        .bind(&session.symbol)
        .bind(&session.prompt)
        .bind(&session.reasoning)
        .bind(session.start_time.timestamp_millis())
        .bind(session.end_time.timestamp_millis())
        .bind(session.success)
        .bind(&session.error)
        .execute(&mut *tx)
        .await
        .context("Failed to insert session row")?;

        let mut written = 0usize;
        for trade in &session.trades {
            if self.insert_trade(&mut tx, &session_id, trade).await? {
                written += 1;
            }
        }

        tx.commit().await.context("Failed to commit session")?;
        info!(
            "SessionRepository: persisted session {} for {} ({} trade rows)",
            session_id, session.symbol, written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::session::TradeOperation;
    use crate::infrastructure::persistence::Database;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sqlx::Row;

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(AuditSymbol::from_symbol("BTC/USDT"), Some(AuditSymbol::Btc));
        assert_eq!(AuditSymbol::from_symbol("doge"), Some(AuditSymbol::Doge));
        assert_eq!(AuditSymbol::from_symbol("XRP/USDT"), None);
    }

    fn session_with_trades(symbol: &str, trades: Vec<TradeRecord>) -> TradingSession {
        TradingSession {
            symbol: symbol.to_string(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            prompt: "prompt".to_string(),
            reasoning: "reasoning".to_string(),
            tool_calls: vec![],
            success: true,
            error: None,
            trades,
        }
    }

    fn trade(symbol: &str) -> TradeRecord {
        TradeRecord {
            symbol: symbol.to_string(),
            operation: TradeOperation::Buy,
            leverage: Some(5),
            amount: Some(dec!(100)),
            pricing: None,
            stop_loss: Some(dec!(95000)),
            take_profit: None,
        }
    }

    // A file-backed database per test; a pooled in-memory SQLite would give
    // every pooled connection its own empty schema.
    fn temp_db_url() -> (String, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("audit-db-{}.db", uuid::Uuid::new_v4()));
        (format!("sqlite://{}", path.display()), path)
    }

    #[tokio::test]
    async fn test_save_writes_parent_and_children() {
        let (url, path) = temp_db_url();
        let db = Database::new(&url).await.unwrap();
        let repository = SqliteSessionRepository::new(db.pool.clone());

        repository
            .save(&session_with_trades(
                "BTC/USDT",
                vec![trade("BTC/USDT"), trade("BTC/USDT")],
            ))
            .await
            .unwrap();

        let sessions = sqlx::query("SELECT COUNT(*) AS n FROM reasoning_sessions")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(sessions.get::<i64, _>("n"), 1);

        let trades = sqlx::query("SELECT COUNT(*) AS n FROM trades")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(trades.get::<i64, _>("n"), 2);

        db.pool.close().await;
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_unmapped_symbol_skips_trade_row_not_session() {
        let (url, path) = temp_db_url();
        let db = Database::new(&url).await.unwrap();
        let repository = SqliteSessionRepository::new(db.pool.clone());

        repository
            .save(&session_with_trades("XRP/USDT", vec![trade("XRP/USDT")]))
            .await
            .unwrap();

        let sessions = sqlx::query("SELECT COUNT(*) AS n FROM reasoning_sessions")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(sessions.get::<i64, _>("n"), 1);

        let trades = sqlx::query("SELECT COUNT(*) AS n FROM trades")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(trades.get::<i64, _>("n"), 0);

        db.pool.close().await;
        std::fs::remove_file(&path).ok();
    }
}
