//! Batch replay of account commands.
//!
//! Streams a CSV of commands through the ledger in file order, then writes
//! the final account states. Rejected commands are logged and skipped; the
//! batch keeps going.

use crate::command::{CommandKind, CommandRecord, ParsedCommand};
use crate::entitlement;
use crate::error::{LedgerError, Result};
use crate::ledger::{AccountLedger, CreateAccountRequest, UpdateAccountRequest};
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use std::io::{Read, Write};

/// Counts of commands applied and rejected during a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Drives a ledger from CSV command input.
pub struct Replayer {
    ledger: AccountLedger,
}

impl Replayer {
    pub fn new(ledger: AccountLedger) -> Self {
        Replayer { ledger }
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Processes commands from a CSV reader in streaming fashion.
    pub fn process_csv<R: Read>(&self, reader: R) -> Result<ReplaySummary> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut summary = ReplaySummary::default();
        for (row_idx, result) in csv_reader.deserialize::<CommandRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = result
                .map_err(LedgerError::from)
                .and_then(|record| record.parse(row_num))
                .and_then(|cmd| self.apply(cmd, row_num));

            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!("Row {}: {}", row_num, e);
                    summary.rejected += 1;
                }
            }
        }

        info!(
            "Replay finished: {} applied, {} rejected",
            summary.applied, summary.rejected
        );
        Ok(summary)
    }

    fn apply(&self, cmd: ParsedCommand, row: usize) -> Result<()> {
        let email = cmd.email;
        match cmd.kind {
            CommandKind::Create { name } => {
                let account = self
                    .ledger
                    .create_account(&CreateAccountRequest { email, name })?;
                debug!("Row {}: Created account {}", row, account.id);
            }
            CommandKind::Update {
                new_email,
                name,
                status,
            } => {
                let id = self.account_id(&email)?;
                let req = UpdateAccountRequest {
                    email: new_email,
                    name,
                    status,
                };
                self.ledger.update_account(&id, &req)?;
                debug!("Row {}: Updated account {}", row, id);
            }
            CommandKind::Delete => {
                let id = self.account_id(&email)?;
                self.ledger.delete_account(&id)?;
                debug!("Row {}: Deleted account {}", row, id);
            }
            CommandKind::AddCoins(amount) => {
                let id = self.account_id(&email)?;
                self.ledger.add_coins(&id, amount)?;
                debug!("Row {}: Added {} coins to account {}", row, amount, id);
            }
            CommandKind::DeductCoins(amount) => {
                let id = self.account_id(&email)?;
                self.ledger.deduct_coins(&id, amount)?;
                debug!("Row {}: Deducted {} coins from account {}", row, amount, id);
            }
            CommandKind::Activate(duration) => {
                let id = self.account_id(&email)?;
                self.ledger.activate_subscription(&id, duration)?;
                debug!("Row {}: Activated subscription for account {}", row, id);
            }
            CommandKind::Renew(duration) => {
                let id = self.account_id(&email)?;
                self.ledger.renew_subscription(&id, duration)?;
                debug!("Row {}: Renewed subscription for account {}", row, id);
            }
        }

        Ok(())
    }

    fn account_id(&self, email: &str) -> Result<String> {
        Ok(self.ledger.get_account_by_email(email)?.id.to_string())
    }

    /// Writes final account states to CSV, sorted by email.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "email",
            "name",
            "status",
            "coins_balance",
            "total_coins_purchased",
            "is_trial",
            "has_subscription",
            "has_access",
        ])?;

        let mut accounts = self.ledger.all_accounts()?;
        accounts.sort_by(|a, b| a.email.cmp(&b.email));

        for account in &accounts {
            csv_writer.write_record([
                account.email.clone(),
                account.name.clone(),
                account.status.to_string(),
                account.coins_balance.to_string(),
                account.total_coins_purchased.to_string(),
                account.is_trial.to_string(),
                account.has_subscription.to_string(),
                entitlement::has_access(account).to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}
