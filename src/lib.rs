//! # Account Ledger
//!
//! Balance, subscription and status management for user accounts, built on
//! guarded atomic store writes instead of locks held by the caller.
//!
//! ## Design Principles
//!
//! - **Guarded writes**: every precondition is checked inside the store
//!   primitive that performs the write
//! - **Strict invariants**: balance never negative, subscription latched at
//!   most once, renewal never shortens a running subscription
//! - **Validation first**: invalid input is rejected before any store call
//! - **Best-effort audit**: sink failures are logged, never surfaced
//!
//! ## Example
//!
//! ```no_run
//! use account_ledger::{AccountLedger, CreateAccountRequest, MemoryStore};
//! use std::sync::Arc;
//!
//! let ledger = AccountLedger::new(Arc::new(MemoryStore::new()));
//! let account = ledger
//!     .create_account(&CreateAccountRequest {
//!         email: "ada@example.com".into(),
//!         name: "Ada".into(),
//!     })
//!     .unwrap();
//! ledger.add_coins(&account.id.to_string(), 100).unwrap();
//! ```

pub mod account;
pub mod audit;
pub mod command;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod replay;
pub mod store;
pub mod validation;

pub use account::{Account, AccountStatus};
pub use audit::{AuditEvent, AuditEventType, AuditSink};
pub use config::LedgerConfig;
pub use entitlement::{has_access, has_access_at};
pub use error::{ErrorKind, LedgerError, Result, ValidationError};
pub use ledger::{AccountLedger, CreateAccountRequest, UpdateAccountRequest};
pub use memory::MemoryStore;
pub use replay::{ReplaySummary, Replayer};
pub use store::{AccountPatch, AccountStore, StoreError};
