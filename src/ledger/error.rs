//! Error types for ledger operations.
//!
//! `Display` is the message shown to the user, so it stays human-readable.

use thiserror::Error;

use crate::Amount;
use crate::model::{NotificationId, TxId, Uid};

/// Top-level error returned by every [`Ledger`](super::Ledger) operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("An account with this email already exists.")]
    AlreadyExists,

    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("Invalid token.")]
    Unauthenticated,

    #[error("Unauthorized: Admin access required.")]
    Unauthorized,

    #[error("{0}")]
    NotFound(#[from] NotFound),

    #[error("{0}")]
    PreconditionFailed(#[from] Precondition),
}

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    InvalidCredentials,
    Unauthenticated,
    Unauthorized,
    NotFound,
    PreconditionFailed,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AlreadyExists => ErrorKind::AlreadyExists,
            LedgerError::InvalidCredentials => ErrorKind::InvalidCredentials,
            LedgerError::Unauthenticated => ErrorKind::Unauthenticated,
            LedgerError::Unauthorized => ErrorKind::Unauthorized,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
        }
    }
}

/// A referenced user, transaction or notification does not exist.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotFound {
    #[error("Target user not found.")]
    TargetUser(Uid),

    #[error("Deposit transaction not found.")]
    Deposit(TxId),

    #[error("Notification not found.")]
    Notification(NotificationId),
}

/// A business rule rejected the operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Precondition {
    #[error("Incorrect password.")]
    IncorrectPassword,

    #[error("KYC verification is required for withdrawals.")]
    KycRequired,

    #[error("Insufficient balance.")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("Insufficient balance to cover stake and fee.")]
    InsufficientForStake { available: Amount, required: Amount },

    #[error("Please enter a valid amount.")]
    InvalidAmount(Amount),

    #[error("Deposit {0} has already been processed.")]
    DepositSettled(TxId),
}
