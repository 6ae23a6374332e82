//! Error types for the account ledger.

use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Field-level validation failures.
///
/// Always raised before any store call, so they never leave side effects.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("email is required")]
    EmailRequired,

    #[error("email is too long")]
    EmailTooLong,

    #[error("invalid email format")]
    InvalidEmailFormat,

    #[error("name is required")]
    NameRequired,

    #[error("name is too long")]
    NameTooLong,

    #[error("account ID is required")]
    IdRequired,

    #[error("invalid account ID format")]
    MalformedId,

    #[error("invalid status")]
    InvalidStatus,

    #[error("coin amount must be greater than 0")]
    InvalidAmount,

    #[error("coin amount is too large")]
    AmountTooLarge,

    #[error("subscription duration must be greater than 0")]
    InvalidDuration,

    #[error("subscription duration is too long")]
    DurationTooLong,
}

/// Stable outcome classes an outer API layer translates into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    PreconditionFailed,
    Internal,
}

/// Errors that can occur during ledger operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No account with the given id or email
    #[error("account not found")]
    NotFound,

    /// Request rejected by the validator
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Another account already uses this email
    #[error("account with this email already exists")]
    EmailTaken,

    /// Subscription was already activated once
    #[error("subscription already active")]
    SubscriptionAlreadyActive,

    /// Debit would drive the balance negative
    #[error("insufficient coins balance")]
    InsufficientBalance,

    /// Renewal requested for an account that never activated a subscription
    #[error("account does not have an active subscription")]
    NoActiveSubscription,

    /// Credit would overflow the balance counters
    #[error("coin balance overflow")]
    BalanceOverflow,

    /// A store call exceeded its fixed bound
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// Unclassified infrastructure failure
    #[error("internal error: {0}")]
    Internal(String),

    /// Failed to open or read an input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid command record in a batch input
    #[error("Invalid command at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },
}

impl LedgerError {
    /// Classifies the error into its stable outcome class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound => ErrorKind::NotFound,
            LedgerError::InvalidInput(_) | LedgerError::InvalidRecord { .. } => {
                ErrorKind::InvalidInput
            }
            LedgerError::EmailTaken | LedgerError::SubscriptionAlreadyActive => {
                ErrorKind::Conflict
            }
            LedgerError::InsufficientBalance
            | LedgerError::NoActiveSubscription
            | LedgerError::BalanceOverflow => ErrorKind::PreconditionFailed,
            LedgerError::Timeout(_)
            | LedgerError::Internal(_)
            | LedgerError::Io(_)
            | LedgerError::Csv(_)
            | LedgerError::Config(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LedgerError::NotFound,
            StoreError::EmailTaken => LedgerError::EmailTaken,
            StoreError::AlreadyActive => LedgerError::SubscriptionAlreadyActive,
            StoreError::InsufficientBalance => LedgerError::InsufficientBalance,
            StoreError::NoActiveSubscription => LedgerError::NoActiveSubscription,
            StoreError::Overflow => LedgerError::BalanceOverflow,
            StoreError::InvalidAmount => ValidationError::InvalidAmount.into(),
            StoreError::Timeout(after) => LedgerError::Timeout(after),
            StoreError::Backend(message) => LedgerError::Internal(message),
        }
    }
}
