//! Core domain types for the account ledger.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::Amount;

/// User identifier, the lookup key for sessions and admin operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

/// Transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

/// Notification identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

macro_rules! string_id {
    ($($name:ident),*) => {$(
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    )*};
}

string_id!(Uid, TxId, NotificationId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    #[default]
    Unverified,
    Pending,
    Verified,
    Rejected,
}

/// Outcome an admin may assign to a KYC submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycDecision {
    Verified,
    Rejected,
}

impl From<KycDecision> for KycStatus {
    fn from(decision: KycDecision) -> Self {
        match decision {
            KycDecision::Verified => KycStatus::Verified,
            KycDecision::Rejected => KycStatus::Rejected,
        }
    }
}

/// Outcome an admin may assign to a pending deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositDecision {
    Completed,
    Failed,
}

impl From<DepositDecision> for TxStatus {
    fn from(decision: DepositDecision) -> Self {
        match decision {
            DepositDecision::Completed => TxStatus::Completed,
            DepositDecision::Failed => TxStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Completed,
    Pending,
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TxStatus::Completed => "Completed",
            TxStatus::Pending => "Pending",
            TxStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "TRC20")]
    Trc20,
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "BTC")]
    Btc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("Buy"),
            Direction::Sell => f.write_str("Sell"),
        }
    }
}

/// Spendable and pending funds plus the running profit/loss figures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub balance: Amount,
    pub pending_balance: Amount,
    pub pl: Amount,
    pub pl_percentage: f64,
}

/// An immutable record of a balance-affecting event.
///
/// For trades `amount` is the signed profit/loss and `date` is the trade's
/// start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub asset: String,
    pub amount: Amount,
    pub status: TxStatus,
    #[serde(deserialize_with = "deserialize_date")]
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TxKind,
}

/// Kind-specific transaction fields, tagged by `type` in the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TxKind {
    #[serde(rename_all = "camelCase")]
    Deposit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network: Option<Network>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_proof: Option<String>,
    },
    Withdrawal { address: String },
    #[serde(rename_all = "camelCase")]
    Trade {
        pair: String,
        direction: Direction,
        stake: Amount,
        commission: Amount,
        entry_price: f64,
        exit_price: f64,
        end_time: DateTime<Utc>,
    },
}

/// Accepts RFC 3339 timestamps as well as bare `YYYY-MM-DD` dates, which
/// are read as midnight UTC.
fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) => Ok(date.with_timezone(&Utc)),
        Err(_) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|day| day.and_time(NaiveTime::MIN).and_utc()),
    }
}

impl Transaction {
    pub fn is_pending_deposit(&self) -> bool {
        matches!(self.kind, TxKind::Deposit { .. }) && self.status == TxStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Security,
    Transaction,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub date: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub parts: Vec<ChatPart>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ChatPart { text: text.into() }],
        }
    }
}

/// Account as seen outside the store: everything but the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: Uid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub kyc_status: KycStatus,
    #[serde(default)]
    pub portfolio: Portfolio,
    /// Most recent first.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Most recent first.
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Avatar data URL; stored apart from the account record.
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// Incremented on every ledger mutation of this account.
    #[serde(default)]
    pub version: u64,
}

impl User {
    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}

/// Stored account: the public view plus the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub password: String,
}

impl UserRecord {
    /// Copy with the credential stripped.
    pub fn redacted(&self) -> User {
        self.user.clone()
    }
}

/// Identity document images submitted for KYC.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycImages {
    pub id_front: String,
    pub id_back: String,
}

/// Profile details captured at signup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupDetails {
    pub date_of_birth: String,
    pub country: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositRequest {
    pub amount: Amount,
    pub network: Network,
    pub asset: String,
    /// Base64 encoded proof of transfer.
    pub transaction_proof: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawRequest {
    pub amount: Amount,
    pub address: String,
    pub asset: String,
}

/// Outcome of a finished trade, reported by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeResult {
    pub pair: String,
    pub direction: Direction,
    pub stake: Amount,
    pub commission: Amount,
    /// Signed profit/loss.
    pub profit: Amount,
    pub entry_price: f64,
    pub exit_price: f64,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycSubmission {
    pub full_name: String,
    pub date_of_birth: String,
    pub country: String,
    pub address: String,
    pub id_front_base64: String,
    pub id_back_base64: String,
}

/// Entry in the admin KYC review queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycRequest {
    pub user: User,
    pub kyc_images: KycImages,
}

/// A pending deposit flattened with its owner, for admin review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDeposit {
    pub user_email: String,
    pub user_name: String,
    pub user_id: Uid,
    pub transaction: Transaction,
}
