//! Session tokens and the authentication boundary.
//!
//! Tokens are the uid behind a fixed prefix. They never expire and are not
//! signed; logging out only discards the token on the client.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;
use crate::model::Uid;
use crate::store::StoreState;

const TOKEN_PREFIX: &str = "TOKEN_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn issue(uid: &Uid) -> Self {
        Token(format!("{TOKEN_PREFIX}{uid}"))
    }

    /// The uid this token was issued for, if it is well formed.
    pub fn resolve(&self) -> Option<Uid> {
        self.0
            .strip_prefix(TOKEN_PREFIX)
            .filter(|uid| !uid.is_empty())
            .map(Uid::from)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token(value.to_string())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated account, identified by its storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: Uid,
    pub email: String,
}

/// Proof that the caller holds the admin capability.
///
/// Only [`require_admin`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    principal: Principal,
}

impl AdminPrincipal {
    pub fn uid(&self) -> &Uid {
        &self.principal.uid
    }
}

pub fn authenticate(state: &StoreState, token: &Token) -> Result<Principal, LedgerError> {
    let uid = token.resolve().ok_or(LedgerError::Unauthenticated)?;
    let record = state
        .find_by_uid(&uid)
        .ok_or(LedgerError::Unauthenticated)?;
    Ok(Principal {
        uid,
        email: record.user.email.clone(),
    })
}

/// Authenticate and check the admin flag. Unknown tokens are reported as
/// unauthorized as well, since the caller asked for an admin operation.
pub fn require_admin(state: &StoreState, token: &Token) -> Result<AdminPrincipal, LedgerError> {
    let principal = authenticate(state, token).map_err(|_| LedgerError::Unauthorized)?;
    let is_admin = state
        .users
        .get(&principal.email)
        .is_some_and(|record| record.user.is_admin);
    if !is_admin {
        return Err(LedgerError::Unauthorized);
    }
    Ok(AdminPrincipal { principal })
}
