//! User pool and local credit ledger
//!
//! The pool creates users on the target at flow start and mirrors their
//! credit in local atomic counters so stages can assert the target's
//! financial bookkeeping against the harness's own view.

use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use bombard_interfaces::CommerceApi;

/// Ledger error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("no users available for service: {service}")]
    NoUsersForService { service: String },

    #[error("unknown user: {id}")]
    UnknownUser { id: Uuid },
}

/// Shared pool of created users with per-user credit counters
#[derive(Debug, Default)]
pub struct UserPool {
    users_by_service: RwLock<HashMap<String, Vec<Uuid>>>,
    credits: RwLock<HashMap<Uuid, Arc<AtomicI64>>>,
}

impl UserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `count` users on the target and index them under `service`.
    ///
    /// Creation is best-effort: individual failures are logged and skipped,
    /// and the number of users actually created is returned.
    pub async fn create_users_pool(
        &self,
        api: &dyn CommerceApi,
        service: &str,
        count: usize,
        account_amount: i64,
    ) -> usize {
        let mut created = 0;
        for index in 0..count {
            let name = format!("{service}-user-{index}");
            match api.create_user(&name, account_amount).await {
                Ok(user) => {
                    self.register_user(service, user.id, account_amount).await;
                    created += 1;
                }
                Err(error) => {
                    warn!(service, user = %name, %error, "Skipping user that failed to create");
                }
            }
        }
        debug!(service, created, requested = count, "User pool built");
        created
    }

    /// Index an already-created user with its initial credit
    pub async fn register_user(&self, service: &str, id: Uuid, account_amount: i64) {
        self.credits
            .write()
            .await
            .insert(id, Arc::new(AtomicI64::new(account_amount)));
        self.users_by_service
            .write()
            .await
            .entry(service.to_string())
            .or_default()
            .push(id);
    }

    /// Uniformly random user from the service's pool
    pub async fn random_user(&self, service: &str) -> Result<Uuid, LedgerError> {
        let users = self.users_by_service.read().await;
        let ids = users
            .get(service)
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| LedgerError::NoUsersForService {
                service: service.to_string(),
            })?;
        let index = rand::thread_rng().gen_range(0..ids.len());
        Ok(ids[index])
    }

    /// Number of users indexed under a service
    pub async fn pool_size(&self, service: &str) -> usize {
        self.users_by_service
            .read()
            .await
            .get(service)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn credit(&self, user: Uuid) -> Result<Arc<AtomicI64>, LedgerError> {
        self.credits
            .read()
            .await
            .get(&user)
            .cloned()
            .ok_or(LedgerError::UnknownUser { id: user })
    }

    /// Subtract `amount` from the user's credit; returns the new balance.
    ///
    /// Negative balances are permitted: over-withdrawal is a target-side
    /// accounting bug the stages assert on, not a ledger error.
    pub async fn spend(&self, user: Uuid, amount: i64) -> Result<i64, LedgerError> {
        let credit = self.credit(user).await?;
        Ok(credit.fetch_sub(amount, Ordering::SeqCst) - amount)
    }

    /// Add `amount` back to the user's credit; returns the new balance
    pub async fn refund(&self, user: Uuid, amount: i64) -> Result<i64, LedgerError> {
        let credit = self.credit(user).await?;
        Ok(credit.fetch_add(amount, Ordering::SeqCst) + amount)
    }

    /// Current credit balance for a user
    pub async fn balance(&self, user: Uuid) -> Result<i64, LedgerError> {
        let credit = self.credit(user).await?;
        Ok(credit.load(Ordering::SeqCst))
    }
}
