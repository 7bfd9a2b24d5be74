//! Async boundary in front of the ledger.
//!
//! Each call runs its ledger operation to completion under the lock, then
//! waits out the configured latency before resolving, the way a remote API
//! would. Failures are delayed the same way.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::Latency;
use crate::ledger::{Ledger, LedgerError};
use crate::model::{
    ChatMessage, DepositDecision, DepositRequest, KycDecision, KycRequest, KycSubmission,
    NotificationId, PendingDeposit, SignupDetails, TradeResult, TxId, Uid, User, WithdrawRequest,
};
use crate::session::Token;

pub type ApiResult<T> = Result<T, LedgerError>;

/// Cloneable handle to one shared [`Ledger`].
#[derive(Clone)]
pub struct Api {
    ledger: Arc<Mutex<Ledger>>,
    latency: Latency,
}

impl Api {
    pub fn new(ledger: Ledger, latency: Latency) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            latency,
        }
    }

    /// Run `op` against the ledger, then resolve after `delay`.
    async fn call<T>(
        &self,
        delay: Duration,
        op: impl FnOnce(&mut Ledger) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let result = {
            let mut ledger = self.ledger.lock().await;
            op(&mut ledger)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    /// Direct access for batch tooling; no simulated latency.
    pub async fn with_ledger<T>(&self, f: impl FnOnce(&mut Ledger) -> T) -> T {
        let mut ledger = self.ledger.lock().await;
        f(&mut ledger)
    }

    /// Take the ledger back once every other handle is gone.
    pub fn into_ledger(self) -> Option<Ledger> {
        Arc::into_inner(self.ledger).map(Mutex::into_inner)
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
        details: SignupDetails,
    ) -> ApiResult<(User, Token)> {
        self.call(self.latency.standard, |l| l.signup(name, email, password, details))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<(User, Token)> {
        self.call(self.latency.standard, |l| l.login(email, password))
            .await
    }

    pub async fn get_user_by_token(&self, token: &Token) -> ApiResult<User> {
        self.call(self.latency.standard, |l| l.get_by_token(token))
            .await
    }

    pub async fn deposit(&self, token: &Token, request: DepositRequest) -> ApiResult<User> {
        self.call(self.latency.standard, |l| l.deposit(token, request))
            .await
    }

    pub async fn submit_kyc(&self, token: &Token, submission: KycSubmission) -> ApiResult<User> {
        self.call(self.latency.standard, |l| l.submit_kyc(token, submission))
            .await
    }

    pub async fn withdraw(
        &self,
        token: &Token,
        password: &str,
        request: WithdrawRequest,
    ) -> ApiResult<User> {
        self.call(self.latency.standard, |l| l.withdraw(token, password, request))
            .await
    }

    pub async fn complete_trade(&self, token: &Token, trade: TradeResult) -> ApiResult<User> {
        self.call(self.latency.standard, |l| l.complete_trade(token, trade))
            .await
    }

    pub async fn update_chat_history(
        &self,
        token: &Token,
        history: Vec<ChatMessage>,
    ) -> ApiResult<User> {
        self.call(self.latency.chat, |l| l.update_chat_history(token, history))
            .await
    }

    pub async fn mark_all_notifications_read(&self, token: &Token) -> ApiResult<User> {
        self.call(self.latency.mark_all_read, |l| {
            l.mark_all_notifications_read(token)
        })
        .await
    }

    pub async fn mark_notification_read(
        &self,
        token: &Token,
        id: &NotificationId,
    ) -> ApiResult<User> {
        self.call(self.latency.mark_one_read, |l| {
            l.mark_notification_read(token, id)
        })
        .await
    }

    pub async fn get_all_users(&self, token: &Token) -> ApiResult<Vec<User>> {
        self.call(self.latency.standard, |l| l.list_users(token))
            .await
    }

    pub async fn get_pending_kyc(&self, token: &Token) -> ApiResult<Vec<KycRequest>> {
        self.call(self.latency.standard, |l| l.list_pending_kyc(token))
            .await
    }

    pub async fn update_kyc_status(
        &self,
        token: &Token,
        target: &Uid,
        decision: KycDecision,
    ) -> ApiResult<User> {
        self.call(self.latency.standard, |l| {
            l.set_kyc_status(token, target, decision)
        })
        .await
    }

    pub async fn get_pending_deposits(&self, token: &Token) -> ApiResult<Vec<PendingDeposit>> {
        self.call(self.latency.standard, |l| l.list_pending_deposits(token))
            .await
    }

    pub async fn update_deposit_status(
        &self,
        token: &Token,
        target: &Uid,
        tx_id: &TxId,
        decision: DepositDecision,
    ) -> ApiResult<User> {
        self.call(self.latency.standard, |l| {
            l.set_deposit_status(token, target, tx_id, decision)
        })
        .await
    }
}
