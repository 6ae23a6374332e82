//! Account ledger.
//!
//! Validates requests, drives the store's guarded primitives and publishes
//! audit events. The ledger never reads a row to decide whether a write is
//! allowed; every invariant-bearing decision is made by the store primitive
//! that performs the write.
//!
//! # Subscription Bonus
//!
//! Activation and renewal credit a fixed bonus. The guarded transition runs
//! first and the bonus is credited only after it succeeded, so a rejected or
//! racing activation never pays out. The two calls still do not form one
//! atomic unit: if the credit fails after the transition committed, the
//! subscription stays changed without its bonus and the error is returned.

use crate::account::{Account, SUBSCRIPTION_BONUS};
use crate::audit::{
    AuditEvent, AuditEventType, AuditSink, JsonLinesAuditSink, LogAuditSink, NoopAuditSink,
};
use crate::config::LedgerConfig;
use crate::entitlement;
use crate::error::{LedgerError, Result, ValidationError};
use crate::memory::MemoryStore;
use crate::store::{AccountPatch, AccountStore, StoreError};
use crate::validation::{
    normalize_list_bounds, parse_account_id, parse_status, validate_coins, validate_duration,
    validate_email, validate_name,
};
use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Fields supplied when creating an account.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub name: String,
}

/// Fields a caller may change; `None` leaves the field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAccountRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
}

/// Orchestrates every balance, subscription and profile mutation.
pub struct AccountLedger {
    store: Arc<dyn AccountStore>,
    audit: Arc<dyn AuditSink>,
    service_name: String,
}

impl AccountLedger {
    /// Creates a ledger over `store` that discards audit events.
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        AccountLedger {
            store,
            audit: Arc::new(NoopAuditSink),
            service_name: LedgerConfig::default().service_name,
        }
    }

    /// Builds an in-memory ledger from configuration.
    ///
    /// Audit events go to `audit_path` when set, otherwise to the log.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_timeout(config.store_timeout()));
        let audit: Arc<dyn AuditSink> = match &config.audit_path {
            Some(path) => Arc::new(JsonLinesAuditSink::append_to(path).map_err(|e| {
                LedgerError::Config(format!("cannot open audit log {}: {}", path.display(), e))
            })?),
            None => Arc::new(LogAuditSink),
        };

        Ok(Self::new(store)
            .with_audit(audit)
            .with_service_name(config.service_name.clone()))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Creates an account with the starting balance and an open trial.
    ///
    /// The email probe only produces the common-case error early; the
    /// store's unique index decides races between concurrent creations.
    pub fn create_account(&self, req: &CreateAccountRequest) -> Result<Account> {
        validate_email(&req.email)?;
        validate_name(&req.name)?;
        self.ensure_email_free(&req.email)?;

        let account = Account::new_trial(req.email.clone(), req.name.clone(), Utc::now());
        let account = self.store.insert(account).map_err(|e| {
            warn!("Failed to create account for {}: {}", req.email, e);
            LedgerError::from(e)
        })?;

        info!("Created account {} ({})", account.id, account.email);
        self.record(
            AuditEventType::AccountCreated,
            account.id,
            json!({
                "email": account.email,
                "name": account.name,
                "coins_balance": account.coins_balance,
                "is_trial": account.is_trial,
                "trial_ends_at": account.trial_ends_at,
                "has_subscription": account.has_subscription,
                "status": account.status,
            }),
        );
        Ok(account)
    }

    pub fn get_account(&self, id: &str) -> Result<Account> {
        let id = parse_account_id(id)?;
        Ok(self.store.get_by_id(id)?)
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Account> {
        if email.is_empty() {
            return Err(ValidationError::EmailRequired.into());
        }
        Ok(self.store.get_by_email(email)?)
    }

    /// Applies the supplied fields that differ from the stored values.
    ///
    /// Returns the current row without writing when nothing differs.
    pub fn update_account(&self, id: &str, req: &UpdateAccountRequest) -> Result<Account> {
        let id = parse_account_id(id)?;

        if let Some(email) = &req.email {
            validate_email(email)?;
        }
        if let Some(name) = &req.name {
            validate_name(name)?;
        }
        let status = req.status.as_deref().map(parse_status).transpose()?;

        let current = self.store.get_by_id(id)?;

        let mut patch = AccountPatch::default();
        if let Some(email) = req.email.as_ref().filter(|e| **e != current.email) {
            self.ensure_email_free(email)?;
            patch.email = Some(email.clone());
        }
        if let Some(name) = req.name.as_ref().filter(|n| **n != current.name) {
            patch.name = Some(name.clone());
        }
        patch.status = status.filter(|s| *s != current.status);

        if patch.is_empty() {
            info!("No fields changed for account {}, skipping update", id);
            return Ok(current);
        }

        let updated = self.store.update_fields(id, &patch).map_err(|e| {
            warn!("Failed to update account {}: {}", id, e);
            LedgerError::from(e)
        })?;

        info!("Updated account {}", id);
        self.record(
            AuditEventType::AccountUpdated,
            id,
            json!({ "changes": patch_changes(&patch) }),
        );
        Ok(updated)
    }

    /// Hard delete; there is no undo.
    pub fn delete_account(&self, id: &str) -> Result<()> {
        let id = parse_account_id(id)?;
        self.store.delete(id)?;

        info!("Deleted account {}", id);
        self.record(AuditEventType::AccountDeleted, id, json!({}));
        Ok(())
    }

    /// Every account, newest first, without the listing bounds.
    pub fn all_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.store.scan()?)
    }

    /// Lists accounts newest first. Bounds are normalized, never rejected.
    pub fn list_accounts(&self, limit: i64, offset: i64) -> Result<Vec<Account>> {
        let (limit, offset) = normalize_list_bounds(limit, offset);
        debug!("Listing accounts limit={} offset={}", limit, offset);
        Ok(self.store.list(limit, offset)?)
    }

    /// Credits `amount` coins. Not idempotent: a retried call credits again.
    pub fn add_coins(&self, id: &str, amount: i64) -> Result<Account> {
        let id = parse_account_id(id)?;
        validate_coins(amount)?;

        let account = self.store.credit_balance(id, amount).map_err(|e| {
            warn!("Failed to add {} coins to account {}: {}", amount, id, e);
            LedgerError::from(e)
        })?;

        info!("Added {} coins to account {}", amount, id);
        self.record(AuditEventType::CoinsAdded, id, json!({ "amount": amount }));
        Ok(account)
    }

    /// Debits `amount` coins if the balance covers it at write time.
    pub fn deduct_coins(&self, id: &str, amount: i64) -> Result<Account> {
        let id = parse_account_id(id)?;
        validate_coins(amount)?;

        let account = self.store.debit_balance(id, amount).map_err(|e| {
            warn!("Failed to deduct {} coins from account {}: {}", amount, id, e);
            LedgerError::from(e)
        })?;

        info!("Deducted {} coins from account {}", amount, id);
        self.record(AuditEventType::CoinsDeducted, id, json!({ "amount": amount }));
        Ok(account)
    }

    /// Activates the subscription for `duration` from now and credits the
    /// bonus. Succeeds at most once per account.
    ///
    /// Activation clears the trial flag; the trial end date is kept.
    pub fn activate_subscription(&self, id: &str, duration: Duration) -> Result<Account> {
        let id = parse_account_id(id)?;
        validate_duration(duration)?;

        let current = self.store.get_by_id(id)?;
        let ends_at = Utc::now() + duration;

        self.store
            .activate_subscription(id, false, current.trial_ends_at, ends_at)
            .map_err(|e| {
                match e {
                    StoreError::AlreadyActive => {
                        debug!("Subscription for account {} already active", id)
                    }
                    _ => warn!("Failed to activate subscription for account {}: {}", id, e),
                }
                LedgerError::from(e)
            })?;

        let account = self.credit_bonus(id)?;

        info!("Activated subscription for account {} until {}", id, ends_at);
        self.record(
            AuditEventType::SubscriptionActivated,
            id,
            subscription_payload(duration, &account),
        );
        Ok(account)
    }

    /// Extends the subscription by `duration` and credits the bonus.
    ///
    /// A subscription still running is extended from its current end; an
    /// expired one restarts from now.
    pub fn renew_subscription(&self, id: &str, duration: Duration) -> Result<Account> {
        let id = parse_account_id(id)?;
        validate_duration(duration)?;

        let renewed = self
            .store
            .renew_subscription(id, duration, Utc::now())
            .map_err(|e| {
                warn!("Failed to renew subscription for account {}: {}", id, e);
                LedgerError::from(e)
            })?;

        let account = self.credit_bonus(id)?;

        info!(
            "Renewed subscription for account {} until {}",
            id,
            renewed.subscription_ends_at.unwrap_or_default()
        );
        self.record(
            AuditEventType::SubscriptionRenewed,
            id,
            subscription_payload(duration, &account),
        );
        Ok(account)
    }

    /// Loads the account and evaluates its entitlement now.
    pub fn has_access(&self, id: &str) -> Result<bool> {
        let account = self.get_account(id)?;
        Ok(entitlement::has_access(&account))
    }

    fn ensure_email_free(&self, email: &str) -> Result<()> {
        match self.store.get_by_email(email) {
            Ok(_) => Err(LedgerError::EmailTaken),
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn credit_bonus(&self, id: Uuid) -> Result<Account> {
        self.store
            .credit_balance(id, SUBSCRIPTION_BONUS)
            .map_err(|e| {
                error!(
                    "Subscription changed for account {} but bonus credit failed: {}",
                    id, e
                );
                LedgerError::from(e)
            })
    }

    fn record(&self, event_type: AuditEventType, account_id: Uuid, payload: Value) {
        let event = AuditEvent::for_account(&self.service_name, event_type, account_id, payload);
        if let Err(e) = self.audit.publish(&event) {
            warn!(
                "Failed to publish {:?} audit event for account {}: {}",
                event_type, account_id, e
            );
        }
    }
}

fn patch_changes(patch: &AccountPatch) -> Value {
    let mut changes = Map::new();
    if let Some(email) = &patch.email {
        changes.insert("email".into(), json!(email));
    }
    if let Some(name) = &patch.name {
        changes.insert("name".into(), json!(name));
    }
    if let Some(status) = patch.status {
        changes.insert("status".into(), json!(status));
    }
    Value::Object(changes)
}

fn subscription_payload(duration: Duration, account: &Account) -> Value {
    json!({
        "duration_hours": duration.num_seconds() as f64 / 3600.0,
        "subscription_ends_at": account.subscription_ends_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use crate::audit::AuditError;
    use crate::error::ErrorKind;
    use parking_lot::Mutex;
    use std::io;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<AuditEventType> {
            self.events.lock().iter().map(|e| e.event_type).collect()
        }
    }

    impl AuditSink for RecordingSink {
        fn publish(&self, event: &AuditEvent) -> std::result::Result<(), AuditError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn publish(&self, _event: &AuditEvent) -> std::result::Result<(), AuditError> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broker down").into())
        }
    }

    fn ledger() -> (AccountLedger, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let ledger = AccountLedger::new(Arc::new(MemoryStore::new())).with_audit(sink.clone());
        (ledger, sink)
    }

    fn create(ledger: &AccountLedger, email: &str) -> Account {
        ledger
            .create_account(&CreateAccountRequest {
                email: email.to_string(),
                name: "Test User".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn test_create_account_defaults_and_audit() {
        let (ledger, sink) = ledger();
        let account = create(&ledger, "new@example.com");

        assert_eq!(account.coins_balance, 200);
        assert!(account.is_trial);
        assert!(!account.has_subscription);
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(sink.kinds(), [AuditEventType::AccountCreated]);
        assert_eq!(ledger.get_account(&account.id.to_string()).unwrap(), account);
    }

    #[test]
    fn test_create_account_rejects_taken_email() {
        let (ledger, sink) = ledger();
        create(&ledger, "taken@example.com");

        let err = ledger
            .create_account(&CreateAccountRequest {
                email: "taken@example.com".into(),
                name: "Other".into(),
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::EmailTaken));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(sink.kinds().len(), 1);
    }

    #[test]
    fn test_create_account_validates_before_store() {
        let (ledger, sink) = ledger();

        let err = ledger
            .create_account(&CreateAccountRequest {
                email: "not-an-email".into(),
                name: "X".into(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidInput(ValidationError::InvalidEmailFormat)
        ));

        let err = ledger
            .create_account(&CreateAccountRequest {
                email: "ok@example.com".into(),
                name: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(ValidationError::NameRequired)));

        assert!(ledger.list_accounts(0, 0).unwrap().is_empty());
        assert!(sink.kinds().is_empty());
    }

    #[test]
    fn test_id_validation() {
        let (ledger, _) = ledger();

        assert!(matches!(
            ledger.add_coins("", 5),
            Err(LedgerError::InvalidInput(ValidationError::IdRequired))
        ));
        assert!(matches!(
            ledger.deduct_coins("123", 5),
            Err(LedgerError::InvalidInput(ValidationError::MalformedId))
        ));
        assert!(matches!(
            ledger.get_account(&Uuid::new_v4().to_string()),
            Err(LedgerError::NotFound)
        ));
    }

    #[test]
    fn test_add_coins_credits_balance_and_total() {
        let (ledger, sink) = ledger();
        let id = create(&ledger, "coins@example.com").id.to_string();

        let account = ledger.add_coins(&id, 300).unwrap();
        assert_eq!(account.coins_balance, 500);
        assert_eq!(account.total_coins_purchased, 300);
        assert_eq!(
            sink.kinds(),
            [AuditEventType::AccountCreated, AuditEventType::CoinsAdded]
        );
    }

    #[test]
    fn test_coin_amount_bounds() {
        let (ledger, _) = ledger();
        let id = create(&ledger, "bounds@example.com").id.to_string();

        assert!(matches!(
            ledger.add_coins(&id, 0),
            Err(LedgerError::InvalidInput(ValidationError::InvalidAmount))
        ));
        assert!(matches!(
            ledger.deduct_coins(&id, 1_000_001),
            Err(LedgerError::InvalidInput(ValidationError::AmountTooLarge))
        ));
    }

    #[test]
    fn test_deduct_coins_insufficient_leaves_balance() {
        let (ledger, sink) = ledger();
        let id = create(&ledger, "poor@example.com").id.to_string();

        let err = ledger.deduct_coins(&id, 201).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(ledger.get_account(&id).unwrap().coins_balance, 200);
        assert_eq!(sink.kinds(), [AuditEventType::AccountCreated]);

        assert_eq!(ledger.deduct_coins(&id, 200).unwrap().coins_balance, 0);
    }

    #[test]
    fn test_activate_once_with_bonus() {
        let (ledger, _) = ledger();
        let created = create(&ledger, "sub@example.com");
        let id = created.id.to_string();

        let before = Utc::now();
        let account = ledger.activate_subscription(&id, Duration::hours(24)).unwrap();
        assert!(account.has_subscription);
        assert!(!account.is_trial);
        assert_eq!(account.trial_ends_at, created.trial_ends_at);
        assert_eq!(account.coins_balance, 5200);
        assert_eq!(account.total_coins_purchased, 5000);
        let ends_at = account.subscription_ends_at.unwrap();
        assert!(ends_at >= before + Duration::hours(24));
        assert!(ends_at <= Utc::now() + Duration::hours(24));

        let err = ledger
            .activate_subscription(&id, Duration::hours(24))
            .unwrap_err();
        assert!(matches!(err, LedgerError::SubscriptionAlreadyActive));

        let after = ledger.get_account(&id).unwrap();
        assert!(after.has_subscription);
        assert_eq!(after.coins_balance, 5200);
        assert_eq!(after.subscription_ends_at, Some(ends_at));
    }

    #[test]
    fn test_duration_bounds() {
        let (ledger, _) = ledger();
        let id = create(&ledger, "dur@example.com").id.to_string();

        assert!(matches!(
            ledger.activate_subscription(&id, Duration::zero()),
            Err(LedgerError::InvalidInput(ValidationError::InvalidDuration))
        ));
        assert!(matches!(
            ledger.renew_subscription(&id, Duration::hours(8761)),
            Err(LedgerError::InvalidInput(ValidationError::DurationTooLong))
        ));
    }

    #[test]
    fn test_renew_without_subscription_credits_nothing() {
        let (ledger, _) = ledger();
        let id = create(&ledger, "norenew@example.com").id.to_string();

        let err = ledger.renew_subscription(&id, Duration::hours(5)).unwrap_err();
        assert!(matches!(err, LedgerError::NoActiveSubscription));

        let account = ledger.get_account(&id).unwrap();
        assert_eq!(account.coins_balance, 200);
        assert_eq!(account.subscription_ends_at, None);
    }

    #[test]
    fn test_update_writes_only_changed_fields() {
        let (ledger, sink) = ledger();
        let account = create(&ledger, "upd@example.com");
        let id = account.id.to_string();

        let updated = ledger
            .update_account(
                &id,
                &UpdateAccountRequest {
                    email: Some("upd@example.com".into()),
                    name: Some("Renamed".into()),
                    status: Some("suspended".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.status, AccountStatus::Suspended);
        assert_eq!(updated.email, "upd@example.com");

        let events = sink.events.lock();
        let changes = &events.last().unwrap().payload["changes"];
        assert_eq!(changes["name"], "Renamed");
        assert_eq!(changes["status"], "suspended");
        assert!(changes.get("email").is_none());
    }

    #[test]
    fn test_update_with_no_differences_skips_write() {
        let (ledger, sink) = ledger();
        let account = create(&ledger, "same@example.com");

        let result = ledger
            .update_account(
                &account.id.to_string(),
                &UpdateAccountRequest {
                    name: Some(account.name.clone()),
                    status: Some("active".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result, account);
        assert_eq!(sink.kinds(), [AuditEventType::AccountCreated]);
    }

    #[test]
    fn test_update_validates_supplied_fields() {
        let (ledger, _) = ledger();
        let id = create(&ledger, "val@example.com").id.to_string();

        assert!(matches!(
            ledger.update_account(
                &id,
                &UpdateAccountRequest {
                    status: Some("banned".into()),
                    ..Default::default()
                }
            ),
            Err(LedgerError::InvalidInput(ValidationError::InvalidStatus))
        ));
        assert!(matches!(
            ledger.update_account(
                &id,
                &UpdateAccountRequest {
                    email: Some("broken".into()),
                    ..Default::default()
                }
            ),
            Err(LedgerError::InvalidInput(ValidationError::InvalidEmailFormat))
        ));
    }

    #[test]
    fn test_update_rejects_email_of_other_account() {
        let (ledger, _) = ledger();
        create(&ledger, "first@example.com");
        let id = create(&ledger, "second@example.com").id.to_string();

        let err = ledger
            .update_account(
                &id,
                &UpdateAccountRequest {
                    email: Some("first@example.com".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::EmailTaken));
    }

    #[test]
    fn test_delete_account_is_hard() {
        let (ledger, sink) = ledger();
        let id = create(&ledger, "del@example.com").id.to_string();

        ledger.delete_account(&id).unwrap();
        assert!(matches!(ledger.get_account(&id), Err(LedgerError::NotFound)));
        assert!(matches!(ledger.delete_account(&id), Err(LedgerError::NotFound)));
        assert_eq!(
            sink.kinds(),
            [AuditEventType::AccountCreated, AuditEventType::AccountDeleted]
        );
    }

    #[test]
    fn test_has_access_follows_status() {
        let (ledger, _) = ledger();
        let id = create(&ledger, "acc@example.com").id.to_string();
        assert!(ledger.has_access(&id).unwrap());

        ledger
            .update_account(
                &id,
                &UpdateAccountRequest {
                    status: Some("inactive".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!ledger.has_access(&id).unwrap());
    }

    #[test]
    fn test_audit_failure_does_not_fail_operation() {
        let ledger =
            AccountLedger::new(Arc::new(MemoryStore::new())).with_audit(Arc::new(FailingSink));
        let account = ledger
            .create_account(&CreateAccountRequest {
                email: "quiet@example.com".into(),
                name: "Quiet".into(),
            })
            .unwrap();

        let account = ledger.add_coins(&account.id.to_string(), 10).unwrap();
        assert_eq!(account.coins_balance, 210);
    }

    #[test]
    fn test_service_name_is_stamped_on_events() {
        let sink = Arc::new(RecordingSink::default());
        let ledger = AccountLedger::new(Arc::new(MemoryStore::new()))
            .with_audit(sink.clone())
            .with_service_name("user-service");
        create(&ledger, "svc@example.com");

        assert_eq!(sink.events.lock()[0].service_name, "user-service");
    }
}
