use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

pub mod memory;

/// Errors that can occur during account store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account {0} is not in the expected state")]
    Conflict(String),
    #[error("Account {0} already exists")]
    AlreadyExists(String),
    #[error("Account {0} doesn't exist")]
    NotFound(String),
}

/// The roles currently assigned to an account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub account_id: String,
    /// Sorted, without duplicates
    pub role_ids: Vec<String>,
    /// Id of the audit log entry that produced this state
    pub log_id: i64,
    pub updated_at: DateTime<Utc>,
}

/// Persistence of account role assignments.
///
/// Every mutation appends to an audit log and returns the id of the new log
/// entry. That id doubles as the version of the account: updates and deletes
/// only succeed if the caller still holds the current one.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Streams all accounts in account id order, optionally only those that
    /// have every role in `role_ids`.
    fn accounts(&self, role_ids: Option<Vec<String>>) -> BoxStream<'static, AccountRecord>;

    async fn account(&self, account_id: &str) -> Option<AccountRecord>;

    /// Creates an account, failing if it already exists.
    async fn create_account(
        &self,
        account_id: &str,
        role_ids: Vec<String>,
    ) -> Result<i64, StoreError>;

    /// Replaces the roles of an account whose current log id is `expected_log_id`.
    async fn update_account(
        &self,
        account_id: &str,
        expected_log_id: i64,
        role_ids: Vec<String>,
    ) -> Result<i64, StoreError>;

    /// Deletes an account whose current log id is `expected_log_id`.
    async fn delete_account(
        &self,
        account_id: &str,
        expected_log_id: i64,
    ) -> Result<i64, StoreError>;

    /// Returns Ok(()) if healthy, or Err with a descriptive message if unhealthy.
    async fn health_check(&self) -> Result<(), String>;
}
