//! Account model and lifecycle constants.
//!
//! One `Account` is one row in the account store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Coins granted to every new account.
pub const STARTING_BALANCE: i64 = 200;

/// Length of the trial window granted at creation.
pub const TRIAL_HOURS: i64 = 72;

/// Coins credited on every successful activation or renewal.
pub const SUBSCRIPTION_BONUS: i64 = 5000;

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
    Deleted,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 4] = [
        AccountStatus::Active,
        AccountStatus::Inactive,
        AccountStatus::Suspended,
        AccountStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or(())
    }
}

/// Represents a user account's balance, entitlement and status.
///
/// # Invariants
///
/// - `coins_balance >= 0` after every store primitive
/// - `total_coins_purchased` never decreases
/// - `has_subscription` flips false to true at most once
/// - `subscription_ends_at` is `Some` once `has_subscription` is true
/// - `email` is unique across all accounts (enforced by the store)
///
/// # Trial Marker
///
/// `trial_ends_at` is set at creation and never cleared. Activation clears
/// `is_trial` but leaves `trial_ends_at` untouched, so the trial window stays
/// visible as history even though it no longer grants access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque identifier, immutable after creation.
    pub id: Uuid,

    pub email: String,

    pub name: String,

    pub coins_balance: i64,

    /// Lifetime credited coins, bonuses included.
    pub total_coins_purchased: i64,

    pub is_trial: bool,

    pub trial_ends_at: Option<DateTime<Utc>>,

    pub has_subscription: bool,

    pub subscription_ends_at: Option<DateTime<Utc>>,

    pub status: AccountStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Builds a freshly created account: starting balance, open trial window,
    /// no subscription, status active.
    pub fn new_trial(email: String, name: String, now: DateTime<Utc>) -> Self {
        Account {
            id: Uuid::new_v4(),
            email,
            name,
            coins_balance: STARTING_BALANCE,
            total_coins_purchased: 0,
            is_trial: true,
            trial_ends_at: Some(now + Duration::hours(TRIAL_HOURS)),
            has_subscription: false,
            subscription_ends_at: None,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the account status is `active`.
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trial_account_defaults() {
        let now = Utc::now();
        let account = Account::new_trial("a@example.com".into(), "A".into(), now);

        assert_eq!(account.coins_balance, 200);
        assert_eq!(account.total_coins_purchased, 0);
        assert!(account.is_trial);
        assert_eq!(account.trial_ends_at, Some(now + Duration::hours(72)));
        assert!(!account.has_subscription);
        assert_eq!(account.subscription_ends_at, None);
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn test_new_trial_accounts_get_distinct_ids() {
        let now = Utc::now();
        let a = Account::new_trial("a@example.com".into(), "A".into(), now);
        let b = Account::new_trial("b@example.com".into(), "B".into(), now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in AccountStatus::ALL {
            assert_eq!(status.to_string().parse::<AccountStatus>(), Ok(status));
        }
        assert!("Active".parse::<AccountStatus>().is_err());
        assert!("banned".parse::<AccountStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&AccountStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }
}
