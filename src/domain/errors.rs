use thiserror::Error;

/// Errors produced by the order placement path. The variants mirror the
/// escalation ladder: plain rejection, transient exchange trouble, a rolled
/// back position, and the unprotected-position case that demands a human.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Order rejected: {reason}")]
    Rejected { reason: String },

    #[error("Exchange request failed: {reason}")]
    Transient { reason: String },

    #[error("protection failed; position closed (main order {main_order_id})")]
    ProtectionFailed { main_order_id: String },

    #[error(
        "MANUAL INTERVENTION REQUIRED: order {main_order_id} holds an unprotected position: {reason}"
    )]
    Critical {
        main_order_id: String,
        reason: String,
    },
}

impl BrokerError {
    pub fn is_critical(&self) -> bool {
        matches!(self, BrokerError::Critical { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_message_carries_order_id() {
        let err = BrokerError::Critical {
            main_order_id: "9912".to_string(),
            reason: "rollback failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("MANUAL INTERVENTION REQUIRED"));
        assert!(msg.contains("9912"));
        assert!(err.is_critical());
    }
}
