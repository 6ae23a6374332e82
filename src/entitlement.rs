//! Entitlement evaluation.
//!
//! Access requires an active status and either a subscription or a trial
//! whose end lies at or after the evaluation instant.

use crate::account::Account;
use chrono::{DateTime, Utc};

/// Returns `true` if the account currently has access to paid functionality.
pub fn has_access(account: &Account) -> bool {
    has_access_at(account, Utc::now())
}

/// Evaluates access at a fixed instant.
pub fn has_access_at(account: &Account, now: DateTime<Utc>) -> bool {
    if !account.is_active() {
        return false;
    }

    if account.has_subscription
        && account
            .subscription_ends_at
            .is_some_and(|ends_at| ends_at >= now)
    {
        return true;
    }

    account.is_trial && account.trial_ends_at.is_some_and(|ends_at| ends_at >= now)
}
