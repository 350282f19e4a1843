/*
 * quota.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Per-user prompt allowance.
 */

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prompts a non-premium user may send.
pub const FREE_PROMPT_LIMIT: u32 = 15;

/// Shown when a non-premium user has no prompts left.
pub const QUOTA_EXHAUSTED_MESSAGE: &str = "You've used all of your free AI prompts. Upgrade to premium to keep editing with AI.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptQuota {
    /// AI requests made so far.
    pub total: u32,
    pub remaining: u32,
    pub limit: u32,
    pub is_premium: bool,
}

impl Default for PromptQuota {
    fn default() -> Self {
        Self::from_usage(0, false)
    }
}

impl PromptQuota {
    pub fn from_usage(total: u32, is_premium: bool) -> Self {
        Self::with_limit(total, FREE_PROMPT_LIMIT, is_premium)
    }

    pub fn with_limit(total: u32, limit: u32, is_premium: bool) -> Self {
        let remaining = if is_premium {
            limit
        } else {
            limit.saturating_sub(total)
        };
        Self {
            total,
            remaining,
            limit,
            is_premium,
        }
    }

    pub fn can_submit(&self) -> bool {
        self.is_premium || self.remaining > 0
    }

    pub fn check(&self) -> Result<()> {
        if self.can_submit() {
            Ok(())
        } else {
            Err(Error::QuotaExhausted(QUOTA_EXHAUSTED_MESSAGE.to_string()))
        }
    }

    /// Count one completed request.
    pub fn record_prompt(&mut self) {
        *self = Self::with_limit(self.total.saturating_add(1), self.limit, self.is_premium);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_user_runs_out() {
        let mut quota = PromptQuota::from_usage(FREE_PROMPT_LIMIT - 1, false);
        assert_eq!(quota.remaining, 1);
        assert!(quota.check().is_ok());

        quota.record_prompt();
        assert_eq!(quota.remaining, 0);
        assert!(!quota.can_submit());
        assert_eq!(
            quota.check(),
            Err(Error::QuotaExhausted(QUOTA_EXHAUSTED_MESSAGE.to_string()))
        );
    }

    #[test]
    fn test_usage_beyond_limit_saturates() {
        let quota = PromptQuota::from_usage(40, false);
        assert_eq!(quota.remaining, 0);
        assert_eq!(quota.total, 40);
    }

    #[test]
    fn test_premium_is_never_blocked() {
        let mut quota = PromptQuota::from_usage(500, true);
        assert_eq!(quota.remaining, quota.limit);
        quota.record_prompt();
        assert_eq!(quota.total, 501);
        assert!(quota.can_submit());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(PromptQuota::from_usage(3, false)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"total": 3, "remaining": 12, "limit": 15, "isPremium": false})
        );
    }
}
