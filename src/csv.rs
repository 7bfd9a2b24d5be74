use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::model::{DepositDecision, KycDecision, KycStatus, Uid, User};
use crate::replay::{Actor, Command};

/// Errors that can occur when reading a scenario script
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open csv file: {0}")]
    Open(#[source] csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command type '{kind}'")]
    UnrecognizedType { line: usize, kind: String },

    #[error("line {line}: {kind} missing amount")]
    MissingAmount { line: usize, kind: String },

    #[error("line {line}: {kind} missing {field}")]
    MissingField {
        line: usize,
        kind: String,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    email: String,
    password: String,
    amount: Option<f64>,
    stake: Option<f64>,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    email: &'a str,
    uid: &'a Uid,
    name: &'a str,
    kyc: KycStatus,
    balance: String,
    pending: String,
    transactions: usize,
}

impl InputRow {
    fn into_command(self, line: usize) -> Result<Command, CsvError> {
        let InputRow {
            r#type: kind,
            email,
            password,
            amount,
            stake,
            detail,
        } = self;
        let actor = Actor { email, password };
        let missing = |field: &'static str| CsvError::MissingField {
            line,
            kind: kind.clone(),
            field,
        };
        let amount = amount.map(Amount::from_float).ok_or_else(|| CsvError::MissingAmount {
            line,
            kind: kind.clone(),
        });

        let command = match kind.as_str() {
            "signup" => Command::Signup {
                actor,
                name: detail.ok_or_else(|| missing("name"))?,
            },
            "deposit" => Command::Deposit {
                actor,
                amount: amount?,
                asset: detail.unwrap_or_else(|| "USDT".to_string()),
            },
            "kyc" => Command::SubmitKyc {
                actor,
                full_name: detail.ok_or_else(|| missing("full name"))?,
            },
            "withdraw" => Command::Withdraw {
                actor,
                amount: amount?,
                address: detail.ok_or_else(|| missing("address"))?,
            },
            "trade" => Command::Trade {
                actor,
                stake: stake
                    .map(Amount::from_float)
                    .ok_or_else(|| missing("stake"))?,
                profit: amount?,
                pair: detail.unwrap_or_else(|| "BTC-USDT".to_string()),
            },
            "approve_kyc" | "reject_kyc" => Command::ReviewKyc {
                actor,
                target: detail.ok_or_else(|| missing("target email"))?,
                decision: if kind == "approve_kyc" {
                    KycDecision::Verified
                } else {
                    KycDecision::Rejected
                },
            },
            "approve_deposits" | "decline_deposits" => Command::ReviewDeposits {
                actor,
                target: detail.ok_or_else(|| missing("target email"))?,
                decision: if kind == "approve_deposits" {
                    DepositDecision::Completed
                } else {
                    DepositDecision::Failed
                },
            },
            other => {
                return Err(CsvError::UnrecognizedType {
                    line,
                    kind: other.to_string(),
                });
            }
        };
        Ok(command)
    }
}

/// Read scenario commands from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            row.into_command(line)
        }))
}

/// write user accounts to stdout in csv format
pub fn write_accounts<'a>(users: impl IntoIterator<Item = &'a User>) -> Result<(), csv::Error> {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for user in users {
        writer.serialize(OutputRow {
            email: &user.email,
            uid: &user.uid,
            name: &user.name,
            kyc: user.kyc_status,
            balance: format!("{:.2}", user.portfolio.balance),
            pending: format!("{:.2}", user.portfolio.pending_balance),
            transactions: user.transactions.len(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
