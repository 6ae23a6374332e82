//! Command models for CSV batch input.

use crate::error::{LedgerError, Result};
use chrono::Duration;
use serde::Deserialize;

/// Raw command record as read from CSV.
///
/// Accounts are addressed by email. Optional columns may be empty or
/// missing entirely.
#[derive(Debug, Deserialize)]
pub struct CommandRecord {
    /// Operation: create, update, delete, add_coins, deduct_coins, activate, renew
    pub op: String,

    /// Email of the account the command applies to
    pub email: String,

    /// Display name (create, update)
    pub name: Option<String>,

    /// New status (update)
    pub status: Option<String>,

    /// Replacement email (update)
    pub new_email: Option<String>,

    /// Coins for coin operations, hours for subscription operations
    pub amount: Option<String>,
}

impl CommandRecord {
    /// Parses the raw CSV record into a typed command.
    pub fn parse(&self, row: usize) -> Result<ParsedCommand> {
        let op = self.op.trim().to_lowercase();
        let invalid = |message: String| LedgerError::InvalidRecord { row, message };

        let kind = match op.as_str() {
            "create" => CommandKind::Create {
                name: self
                    .name
                    .clone()
                    .ok_or_else(|| invalid("create requires a name".into()))?,
            },
            "update" => CommandKind::Update {
                new_email: self.new_email.clone(),
                name: self.name.clone(),
                status: self.status.clone(),
            },
            "delete" => CommandKind::Delete,
            "add_coins" => CommandKind::AddCoins(self.parse_amount(row)?),
            "deduct_coins" => CommandKind::DeductCoins(self.parse_amount(row)?),
            "activate" => CommandKind::Activate(self.parse_hours(row)?),
            "renew" => CommandKind::Renew(self.parse_hours(row)?),
            other => return Err(invalid(format!("unknown operation '{}'", other))),
        };

        Ok(ParsedCommand {
            email: self.email.trim().to_string(),
            kind,
        })
    }

    fn parse_hours(&self, row: usize) -> Result<Duration> {
        let hours = self.parse_amount(row)?;
        Duration::try_hours(hours).ok_or_else(|| LedgerError::InvalidRecord {
            row,
            message: format!("{} hours is out of range", hours),
        })
    }

    fn parse_amount(&self, row: usize) -> Result<i64> {
        let raw = self.amount.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(LedgerError::InvalidRecord {
                row,
                message: format!("{} requires an amount", self.op.trim()),
            });
        }
        raw.parse().map_err(|_| LedgerError::InvalidRecord {
            row,
            message: format!("amount '{}' is not an integer", raw),
        })
    }
}

/// A parsed command ready to run against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub email: String,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Create {
        name: String,
    },
    Update {
        new_email: Option<String>,
        name: Option<String>,
        status: Option<String>,
    },
    Delete,
    AddCoins(i64),
    DeductCoins(i64),
    /// Activate for the given duration.
    Activate(Duration),
    /// Extend by the given duration.
    Renew(Duration),
}
