//! Account store contract.
//!
//! Every mutating primitive evaluates its precondition and applies its write
//! as one indivisible step with respect to every other primitive on the same
//! row. Callers never read, decide, then write: the guard travels with the
//! write. This is the only concurrency control the ledger relies on.

use crate::account::{Account, AccountStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by an account store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no matching account row")]
    NotFound,

    #[error("email already in use")]
    EmailTaken,

    #[error("subscription already active")]
    AlreadyActive,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("no active subscription")]
    NoActiveSubscription,

    #[error("balance overflow")]
    Overflow,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The subset of mutable profile fields a single update writes.
///
/// Only `Some` fields are applied; an empty patch performs no write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub status: Option<AccountStatus>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none() && self.status.is_none()
    }
}

/// Row-oriented account storage with guarded atomic mutations.
///
/// Mutating primitives return the row as it stands right after their write.
pub trait AccountStore: Send + Sync {
    /// Inserts a new row. Fails `EmailTaken` if the email is already used;
    /// this check is the authoritative uniqueness guarantee.
    fn insert(&self, account: Account) -> StoreResult<Account>;

    fn get_by_id(&self, id: Uuid) -> StoreResult<Account>;

    fn get_by_email(&self, email: &str) -> StoreResult<Account>;

    /// Rows ordered by creation time, most recent first.
    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<Account>>;

    /// Every row, in `list` order, without paging bounds.
    fn scan(&self) -> StoreResult<Vec<Account>>;

    /// Hard delete.
    fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// `balance += amount` and `total_purchased += amount`.
    fn credit_balance(&self, id: Uuid, amount: i64) -> StoreResult<Account>;

    /// `balance -= amount`, only if `balance >= amount` at write time.
    fn debit_balance(&self, id: Uuid, amount: i64) -> StoreResult<Account>;

    /// Latches `has_subscription` and sets the given fields, only if
    /// `has_subscription` is currently false.
    fn activate_subscription(
        &self,
        id: Uuid,
        is_trial: bool,
        trial_ends_at: Option<DateTime<Utc>>,
        subscription_ends_at: DateTime<Utc>,
    ) -> StoreResult<Account>;

    /// Extends `subscription_ends_at` by `duration`, only if
    /// `has_subscription` is true. The base is the stored end while it is
    /// after `now`, otherwise `now`; it is read under the same guard as the
    /// write, so the end only ever moves forward.
    fn renew_subscription(
        &self,
        id: Uuid,
        duration: ChronoDuration,
        now: DateTime<Utc>,
    ) -> StoreResult<Account>;

    /// Applies the supplied subset of fields as one write. An empty patch
    /// returns the current row untouched.
    fn update_fields(&self, id: Uuid, patch: &AccountPatch) -> StoreResult<Account>;
}
