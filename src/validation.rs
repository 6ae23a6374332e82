//! Field constraint checks.
//!
//! Pure functions; nothing here touches the store.

use crate::account::AccountStatus;
use crate::error::ValidationError;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_COINS_AMOUNT: i64 = 1_000_000;
pub const MAX_SUBSCRIPTION_HOURS: i64 = 8760;
pub const DEFAULT_LIST_LIMIT: i64 = 10;
pub const MAX_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_OFFSET: i64 = 10_000;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern compiles")
});

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Checks presence, length and format of an email address.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    if email.is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ValidationError::InvalidEmailFormat);
    }
    Ok(())
}

pub fn validate_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}

/// Parses an account id, distinguishing a missing id from a malformed one.
pub fn parse_account_id(id: &str) -> ValidationResult<Uuid> {
    if id.is_empty() {
        return Err(ValidationError::IdRequired);
    }
    Uuid::parse_str(id).map_err(|_| ValidationError::MalformedId)
}

pub fn parse_status(status: &str) -> ValidationResult<AccountStatus> {
    status
        .parse()
        .map_err(|_| ValidationError::InvalidStatus)
}

/// Coin amounts must lie in `[1, MAX_COINS_AMOUNT]`.
pub fn validate_coins(amount: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::InvalidAmount);
    }
    if amount > MAX_COINS_AMOUNT {
        return Err(ValidationError::AmountTooLarge);
    }
    Ok(())
}

/// Subscription durations must lie in `(0, MAX_SUBSCRIPTION_HOURS]`.
pub fn validate_duration(duration: Duration) -> ValidationResult<()> {
    if duration <= Duration::zero() {
        return Err(ValidationError::InvalidDuration);
    }
    if duration > Duration::hours(MAX_SUBSCRIPTION_HOURS) {
        return Err(ValidationError::DurationTooLong);
    }
    Ok(())
}

/// Normalizes list paging bounds.
///
/// A non-positive limit falls back to the default and an oversized one is
/// capped; the offset is clamped into `[0, MAX_LIST_OFFSET]`.
pub fn normalize_list_bounds(limit: i64, offset: i64) -> (usize, usize) {
    let limit = if limit <= 0 {
        DEFAULT_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    };
    let offset = offset.clamp(0, MAX_LIST_OFFSET);
    (limit as usize, offset as usize)
}
