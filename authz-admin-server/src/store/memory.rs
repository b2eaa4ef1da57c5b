use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use super::{AccountRecord, AccountStore, StoreError};
use crate::config::AccountSeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Delete,
}

/// An entry in the append-only audit log of account changes.
#[derive(Debug, Clone)]
struct LogEntry {
    id: i64,
    created_at: DateTime<Utc>,
    account_id: String,
    action: Action,
    role_ids: Vec<String>,
}

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<String, AccountRecord>,
    log: Vec<LogEntry>,
}

impl Inner {
    /// Appends to the audit log, returning the new entry's id and timestamp.
    fn append(
        &mut self,
        account_id: &str,
        action: Action,
        role_ids: &[String],
    ) -> (i64, DateTime<Utc>) {
        let entry = LogEntry {
            id: self.log.len() as i64 + 1,
            created_at: Utc::now(),
            account_id: account_id.to_string(),
            action,
            role_ids: role_ids.to_vec(),
        };
        log::debug!(
            "Audit log entry {}: {:?} {} {:?}",
            entry.id,
            entry.action,
            entry.account_id,
            entry.role_ids
        );
        let stamp = (entry.id, entry.created_at);
        self.log.push(entry);
        stamp
    }

    fn current(&self, account_id: &str, expected_log_id: i64) -> Result<(), StoreError> {
        match self.accounts.get(account_id) {
            None => Err(StoreError::NotFound(account_id.to_string())),
            Some(record) if record.log_id != expected_log_id => {
                Err(StoreError::Conflict(account_id.to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

/// An account store that keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `seeds`.
    pub fn with_accounts(seeds: &[AccountSeed]) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for seed in seeds {
                if inner.accounts.contains_key(&seed.id) {
                    continue;
                }
                let role_ids = normalize(seed.roles.clone());
                let (log_id, updated_at) = inner.append(&seed.id, Action::Create, &role_ids);
                log::info!("Created required account {}", seed.id);
                inner.accounts.insert(
                    seed.id.clone(),
                    AccountRecord {
                        account_id: seed.id.clone(),
                        role_ids,
                        log_id,
                        updated_at,
                    },
                );
            }
        }
        store
    }
}

fn normalize(role_ids: Vec<String>) -> Vec<String> {
    role_ids
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl AccountStore for InMemoryStore {
    fn accounts(&self, role_ids: Option<Vec<String>>) -> BoxStream<'static, AccountRecord> {
        let snapshot: Vec<AccountRecord> = {
            let inner = self.inner.lock();
            inner
                .accounts
                .values()
                .filter(|record| match &role_ids {
                    Some(required) => required.iter().all(|r| record.role_ids.contains(r)),
                    None => true,
                })
                .cloned()
                .collect()
        };
        stream::iter(snapshot).boxed()
    }

    async fn account(&self, account_id: &str) -> Option<AccountRecord> {
        self.inner.lock().accounts.get(account_id).cloned()
    }

    async fn create_account(
        &self,
        account_id: &str,
        role_ids: Vec<String>,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        if inner.accounts.contains_key(account_id) {
            return Err(StoreError::AlreadyExists(account_id.to_string()));
        }
        let role_ids = normalize(role_ids);
        let (log_id, updated_at) = inner.append(account_id, Action::Create, &role_ids);
        inner.accounts.insert(
            account_id.to_string(),
            AccountRecord {
                account_id: account_id.to_string(),
                role_ids,
                log_id,
                updated_at,
            },
        );
        log::info!("Created account {account_id}");
        Ok(log_id)
    }

    async fn update_account(
        &self,
        account_id: &str,
        expected_log_id: i64,
        role_ids: Vec<String>,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        inner.current(account_id, expected_log_id)?;
        let role_ids = normalize(role_ids);
        let (log_id, updated_at) = inner.append(account_id, Action::Update, &role_ids);
        if let Some(record) = inner.accounts.get_mut(account_id) {
            record.role_ids = role_ids;
            record.log_id = log_id;
            record.updated_at = updated_at;
        }
        log::info!("Updated account {account_id}");
        Ok(log_id)
    }

    async fn delete_account(
        &self,
        account_id: &str,
        expected_log_id: i64,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        inner.current(account_id, expected_log_id)?;
        let role_ids = inner
            .accounts
            .remove(account_id)
            .map(|record| record.role_ids)
            .unwrap_or_default();
        let (log_id, _) = inner.append(account_id, Action::Delete, &role_ids);
        log::info!("Deleted account {account_id}");
        Ok(log_id)
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> InMemoryStore {
        InMemoryStore::with_accounts(&[
            AccountSeed {
                id: "b@example.com".to_string(),
                roles: vec!["X".to_string(), "Y".to_string()],
            },
            AccountSeed {
                id: "a@example.com".to_string(),
                roles: vec!["Y".to_string(), "Y".to_string()],
            },
        ])
    }

    #[tokio::test]
    async fn test_accounts_are_ordered_and_filtered() {
        let store = seeded();
        let all: Vec<_> = store.accounts(None).collect().await;
        let ids: Vec<_> = all.iter().map(|r| r.account_id.as_str()).collect();
        assert_eq!(ids, vec!["a@example.com", "b@example.com"]);
        assert_eq!(all[0].role_ids, vec!["Y"]);

        let with_x: Vec<_> = store.accounts(Some(vec!["X".to_string()])).collect().await;
        assert_eq!(with_x.len(), 1);
        assert_eq!(with_x[0].account_id, "b@example.com");

        let with_both: Vec<_> = store
            .accounts(Some(vec!["X".to_string(), "Y".to_string()]))
            .collect()
            .await;
        assert_eq!(with_both.len(), 1);
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let store = InMemoryStore::new();
        let created = store
            .create_account("c", vec!["B".into(), "A".into()])
            .await
            .unwrap();
        assert!(matches!(
            store.create_account("c", vec![]).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.account("c").await.unwrap().role_ids, vec!["A", "B"]);

        let updated = store
            .update_account("c", created, vec!["A".into()])
            .await
            .unwrap();
        assert!(updated > created);
        assert_eq!(store.account("c").await.unwrap().log_id, updated);

        // The old version lost the race.
        assert!(matches!(
            store.update_account("c", created, vec![]).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.delete_account("c", created).await,
            Err(StoreError::Conflict(_))
        ));

        store.delete_account("c", updated).await.unwrap();
        assert!(store.account("c").await.is_none());
        assert!(matches!(
            store.delete_account("c", updated).await,
            Err(StoreError::NotFound(_))
        ));

        let actions: Vec<_> = store.inner.lock().log.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![Action::Create, Action::Update, Action::Delete]
        );
    }
}
