//! In-process account store.
//!
//! All rows live behind a single `parking_lot::Mutex`, so each primitive's
//! guard and write run inside one critical section. Lock acquisition is
//! bounded by the configured timeout; a caller that cannot get the lock in
//! time fails with `StoreError::Timeout` instead of blocking.

use crate::account::Account;
use crate::store::{AccountPatch, AccountStore, StoreError, StoreResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Default bound on every store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

struct StoredRow {
    /// Insertion sequence, breaks `created_at` ties in listings.
    seq: u64,
    account: Account,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<Uuid, StoredRow>,
    /// Unique index on email.
    by_email: HashMap<String, Uuid>,
    next_seq: u64,
}

impl Tables {
    fn row_mut(&mut self, id: Uuid) -> StoreResult<&mut Account> {
        self.rows
            .get_mut(&id)
            .map(|row| &mut row.account)
            .ok_or(StoreError::NotFound)
    }

    fn newest_first(&self) -> impl Iterator<Item = &StoredRow> {
        let mut rows: Vec<&StoredRow> = self.rows.values().collect();
        rows.sort_by(|a, b| {
            b.account
                .created_at
                .cmp(&a.account.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        rows.into_iter()
    }
}

/// Account store holding every row in memory.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    timeout: Duration,
}

impl MemoryStore {
    /// Creates an empty store with the default call timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        MemoryStore {
            tables: Mutex::new(Tables::default()),
            timeout,
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.rows.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .try_lock_for(self.timeout)
            .ok_or(StoreError::Timeout(self.timeout))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryStore {
    fn insert(&self, account: Account) -> StoreResult<Account> {
        let mut tables = self.lock()?;

        if tables.by_email.contains_key(&account.email) {
            return Err(StoreError::EmailTaken);
        }
        if tables.rows.contains_key(&account.id) {
            return Err(StoreError::Backend(format!(
                "duplicate account id {}",
                account.id
            )));
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.by_email.insert(account.email.clone(), account.id);
        tables.rows.insert(
            account.id,
            StoredRow {
                seq,
                account: account.clone(),
            },
        );

        debug!("Inserted account {}", account.id);
        Ok(account)
    }

    fn get_by_id(&self, id: Uuid) -> StoreResult<Account> {
        let tables = self.lock()?;
        tables
            .rows
            .get(&id)
            .map(|row| row.account.clone())
            .ok_or(StoreError::NotFound)
    }

    fn get_by_email(&self, email: &str) -> StoreResult<Account> {
        let tables = self.lock()?;
        tables
            .by_email
            .get(email)
            .and_then(|id| tables.rows.get(id))
            .map(|row| row.account.clone())
            .ok_or(StoreError::NotFound)
    }

    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<Account>> {
        let tables = self.lock()?;
        Ok(tables
            .newest_first()
            .skip(offset)
            .take(limit)
            .map(|row| row.account.clone())
            .collect())
    }

    fn scan(&self) -> StoreResult<Vec<Account>> {
        let tables = self.lock()?;
        Ok(tables
            .newest_first()
            .map(|row| row.account.clone())
            .collect())
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let row = tables.rows.remove(&id).ok_or(StoreError::NotFound)?;
        tables.by_email.remove(&row.account.email);

        debug!("Deleted account {}", id);
        Ok(())
    }

    fn credit_balance(&self, id: Uuid, amount: i64) -> StoreResult<Account> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount);
        }

        let mut tables = self.lock()?;
        let account = tables.row_mut(id)?;

        let balance = account
            .coins_balance
            .checked_add(amount)
            .ok_or(StoreError::Overflow)?;
        let purchased = account
            .total_coins_purchased
            .checked_add(amount)
            .ok_or(StoreError::Overflow)?;

        account.coins_balance = balance;
        account.total_coins_purchased = purchased;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn debit_balance(&self, id: Uuid, amount: i64) -> StoreResult<Account> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount);
        }

        let mut tables = self.lock()?;
        let account = tables.row_mut(id)?;

        if account.coins_balance < amount {
            return Err(StoreError::InsufficientBalance);
        }

        account.coins_balance -= amount;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn activate_subscription(
        &self,
        id: Uuid,
        is_trial: bool,
        trial_ends_at: Option<DateTime<Utc>>,
        subscription_ends_at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let mut tables = self.lock()?;
        let account = tables.row_mut(id)?;

        if account.has_subscription {
            return Err(StoreError::AlreadyActive);
        }

        account.is_trial = is_trial;
        account.trial_ends_at = trial_ends_at;
        account.has_subscription = true;
        account.subscription_ends_at = Some(subscription_ends_at);
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn renew_subscription(
        &self,
        id: Uuid,
        duration: ChronoDuration,
        now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let mut tables = self.lock()?;
        let account = tables.row_mut(id)?;

        if !account.has_subscription {
            return Err(StoreError::NoActiveSubscription);
        }

        let base = match account.subscription_ends_at {
            Some(ends_at) if ends_at > now => ends_at,
            _ => now,
        };
        let ends_at = base.checked_add_signed(duration).ok_or_else(|| {
            StoreError::Backend(format!("subscription end {} + {} out of range", base, duration))
        })?;

        account.subscription_ends_at = Some(ends_at);
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn update_fields(&self, id: Uuid, patch: &AccountPatch) -> StoreResult<Account> {
        let mut tables = self.lock()?;

        let current_email = tables
            .rows
            .get(&id)
            .map(|row| row.account.email.clone())
            .ok_or(StoreError::NotFound)?;

        if patch.is_empty() {
            return tables.row_mut(id).map(|account| account.clone());
        }

        let new_email = patch
            .email
            .as_ref()
            .filter(|email| **email != current_email);
        if let Some(email) = new_email {
            if tables.by_email.contains_key(email) {
                return Err(StoreError::EmailTaken);
            }
            tables.by_email.remove(&current_email);
            tables.by_email.insert(email.clone(), id);
        }

        let account = tables.row_mut(id)?;
        if let Some(email) = &patch.email {
            account.email = email.clone();
        }
        if let Some(name) = &patch.name {
            account.name = name.clone();
        }
        if let Some(status) = patch.status {
            account.status = status;
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }
}
