//! Per-user AI request counts
//!
//! The ledger counts requests per user; whether a user may send another
//! prompt is decided by [`PromptQuota`] from the count and the premium list.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use smartdocs_core::PromptQuota;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::storage::JsonFile;

#[derive(Debug)]
pub struct UsageLedger {
    counts: RwLock<BTreeMap<String, u32>>,
    limit: u32,
    premium_users: HashSet<String>,
    file: Option<JsonFile>,
}

impl UsageLedger {
    pub fn in_memory(limit: u32, premium_users: HashSet<String>) -> Self {
        Self {
            counts: RwLock::new(BTreeMap::new()),
            limit,
            premium_users,
            file: None,
        }
    }

    /// Open the ledger persisted as `usage.json` under `data_dir`.
    pub fn open(data_dir: &Path, limit: u32, premium_users: HashSet<String>) -> Result<Self> {
        let file = JsonFile::in_dir(data_dir, "usage.json")?;
        let counts = file.load()?.unwrap_or_default();
        Ok(Self {
            counts: RwLock::new(counts),
            limit,
            premium_users,
            file: Some(file),
        })
    }

    pub async fn quota(&self, user_id: &str) -> PromptQuota {
        let total = self.counts.read().await.get(user_id).copied().unwrap_or(0);
        self.quota_for(user_id, total)
    }

    /// Claim one prompt for `user_id`, or fail with the quota warning.
    ///
    /// The check and the count happen under one write lock, so concurrent
    /// requests cannot both claim the last prompt. A request that then
    /// fails hands the prompt back with [`UsageLedger::release`].
    pub async fn reserve(&self, user_id: &str) -> Result<PromptQuota> {
        let mut counts = self.counts.write().await;
        let total = counts.get(user_id).copied().unwrap_or(0);
        self.quota_for(user_id, total).check()?;

        let total = total.saturating_add(1);
        counts.insert(user_id.to_string(), total);
        self.persist(&counts)?;
        debug!(user = %user_id, total, "Reserved AI request");
        Ok(self.quota_for(user_id, total))
    }

    /// Return a prompt claimed by [`UsageLedger::reserve`].
    pub async fn release(&self, user_id: &str) -> Result<PromptQuota> {
        let mut counts = self.counts.write().await;
        let total = counts.get(user_id).copied().unwrap_or(0).saturating_sub(1);
        counts.insert(user_id.to_string(), total);
        self.persist(&counts)?;
        debug!(user = %user_id, total, "Released AI request");
        Ok(self.quota_for(user_id, total))
    }

    fn quota_for(&self, user_id: &str, total: u32) -> PromptQuota {
        PromptQuota::with_limit(total, self.limit, self.premium_users.contains(user_id))
    }

    fn persist(&self, counts: &BTreeMap<String, u32>) -> Result<()> {
        match &self.file {
            Some(file) => file.save(counts),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_counts_per_user() {
        let ledger = UsageLedger::in_memory(2, HashSet::new());
        ledger.reserve("alice").await.unwrap();
        let quota = ledger.reserve("alice").await.unwrap();
        assert_eq!(quota.remaining, 0);
        assert!(!quota.can_submit());
        assert_eq!(ledger.quota("bob").await.remaining, 2);
    }

    #[tokio::test]
    async fn test_last_prompt_is_claimed_once() {
        let ledger = UsageLedger::in_memory(1, HashSet::new());
        ledger.reserve("alice").await.unwrap();
        assert!(matches!(
            ledger.reserve("alice").await,
            Err(Error::Core(smartdocs_core::Error::QuotaExhausted(_)))
        ));
        assert_eq!(ledger.quota("alice").await.total, 1);

        let quota = ledger.release("alice").await.unwrap();
        assert_eq!(quota.remaining, 1);
        assert!(ledger.reserve("alice").await.is_ok());
    }

    #[tokio::test]
    async fn test_release_never_goes_below_zero() {
        let ledger = UsageLedger::in_memory(3, HashSet::new());
        assert_eq!(ledger.release("alice").await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_premium_users_are_unlimited() {
        let premium = HashSet::from(["carol".to_string()]);
        let ledger = UsageLedger::in_memory(1, premium);
        ledger.reserve("carol").await.unwrap();
        ledger.reserve("carol").await.unwrap();
        let quota = ledger.quota("carol").await;
        assert!(quota.is_premium);
        assert_eq!(quota.total, 2);
        assert!(quota.can_submit());
    }

    #[tokio::test]
    async fn test_counts_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = UsageLedger::open(dir.path(), 15, HashSet::new()).unwrap();
            ledger.reserve("alice").await.unwrap();
        }
        let ledger = UsageLedger::open(dir.path(), 15, HashSet::new()).unwrap();
        assert_eq!(ledger.quota("alice").await.total, 1);
    }
}
