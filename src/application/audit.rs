//! Append-only audit of finished trading sessions.
//!
//! Two independent targets: a JSON file per session under a dated log
//! directory, and a relational repository. Each target is attempted on its
//! own; a failure in either is logged and swallowed so auditing can never
//! break the trading path.

use crate::domain::ports::SessionRepository;
use crate::domain::trading::session::TradingSession;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub struct AuditSink {
    log_dir: PathBuf,
    repository: Option<Arc<dyn SessionRepository>>,
}

impl AuditSink {
    pub fn new(log_dir: impl Into<PathBuf>, repository: Option<Arc<dyn SessionRepository>>) -> Self {
        Self {
            log_dir: log_dir.into(),
            repository,
        }
    }

    /// Records one session in every configured target. Never fails.
    pub async fn record(&self, session: &TradingSession) {
        if let Err(e) = self.write_file(session).await {
            error!("AuditSink: file log failed for {}: {}", session.symbol, e);
        }

        if let Some(repository) = &self.repository
            && let Err(e) = repository.save(session).await
        {
            error!(
                "AuditSink: relational log failed for {}: {}",
                session.symbol, e
            );
        }
    }

    async fn write_file(&self, session: &TradingSession) -> Result<()> {
        let dir = self
            .log_dir
            .join(format!("trade-{}", session.start_time.format("%Y-%m-%d")));
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create session log directory")?;

        let file_name = format!(
            "{}-{}.json",
            session.symbol.replace('/', "-"),
            session.start_time.timestamp_millis()
        );
        let path = dir.join(file_name);

        let body =
            serde_json::to_vec_pretty(session).context("Failed to serialize session")?;
        tokio::fs::write(&path, body)
            .await
            .context("Failed to write session log file")?;

        info!("AuditSink: session logged to {}", path.display());
        Ok(())
    }
}
