//! Account Directory Port
//!
//! Activity lookup for accounts referenced by an instrument.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub id: String,
    pub active: bool,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_account(&self, id: &str) -> Result<Option<AccountStatus>, EngineError>;
}

/// Fails with `CounterpartyNotActive` unless `id` exists and is active
pub async fn ensure_active(directory: &dyn AccountDirectory, id: &str) -> Result<(), EngineError> {
    match directory.get_account(id).await? {
        Some(account) if account.active => Ok(()),
        Some(_) => Err(EngineError::CounterpartyNotActive {
            account: id.to_string(),
            reason: "inactive".to_string(),
        }),
        None => Err(EngineError::CounterpartyNotActive {
            account: id.to_string(),
            reason: "not found".to_string(),
        }),
    }
}
