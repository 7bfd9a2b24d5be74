//! Batch replay of scripted ledger commands.

use std::collections::HashMap;

use chrono::Utc;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::api::Api;
use crate::ledger::{LedgerError, NotFound};
use crate::model::{
    DepositDecision, DepositRequest, Direction, KycDecision, KycSubmission, Network,
    SignupDetails, TradeResult, TxId, Uid, WithdrawRequest,
};
use crate::session::Token;

/// Who performs a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub email: String,
    pub password: String,
}

/// One scripted event.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Signup { actor: Actor, name: String },
    Deposit { actor: Actor, amount: Amount, asset: String },
    SubmitKyc { actor: Actor, full_name: String },
    Withdraw { actor: Actor, amount: Amount, address: String },
    /// Settles a finished trade. The stake is never debited up front here, so
    /// a win credits stake plus profit and replayed balances are not net PnL.
    Trade {
        actor: Actor,
        pair: String,
        stake: Amount,
        profit: Amount,
    },
    /// Admin decision on the KYC submission of `target` (an email).
    ReviewKyc {
        actor: Actor,
        target: String,
        decision: KycDecision,
    },
    /// Admin decision on every pending deposit of `target` (an email).
    ReviewDeposits {
        actor: Actor,
        target: String,
        decision: DepositDecision,
    },
}

impl Command {
    pub fn actor(&self) -> &Actor {
        match self {
            Command::Signup { actor, .. }
            | Command::Deposit { actor, .. }
            | Command::SubmitKyc { actor, .. }
            | Command::Withdraw { actor, .. }
            | Command::Trade { actor, .. }
            | Command::ReviewKyc { actor, .. }
            | Command::ReviewDeposits { actor, .. } => actor,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Command::Signup { .. } => "signup",
            Command::Deposit { .. } => "deposit",
            Command::SubmitKyc { .. } => "kyc",
            Command::Withdraw { .. } => "withdraw",
            Command::Trade { .. } => "trade",
            Command::ReviewKyc { .. } => "kyc review",
            Command::ReviewDeposits { .. } => "deposit review",
        }
    }
}

/// Applies commands through the [`Api`], logging in actors on demand.
pub struct Replayer {
    api: Api,
    tokens: HashMap<String, Token>,
}

impl Replayer {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            tokens: HashMap::new(),
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn into_api(self) -> Api {
        self.api
    }

    /// Run every command of the stream; failures are logged and skipped.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            let label = command.label();
            let email = command.actor().email.clone();
            match self.apply(command).await {
                Ok(()) => info!(email, "{label} replayed"),
                Err(e) => warn!(email, reason = %e, "{label} failed"),
            }
        }
    }

    pub async fn apply(&mut self, command: Command) -> Result<(), LedgerError> {
        match command {
            Command::Signup { actor, name } => {
                let details = SignupDetails::default();
                let (_, token) = self
                    .api
                    .signup(&name, &actor.email, &actor.password, details)
                    .await?;
                self.tokens.insert(actor.email, token);
            }
            Command::Deposit {
                actor,
                amount,
                asset,
            } => {
                let token = self.token_for(&actor).await?;
                let request = DepositRequest {
                    amount,
                    network: Network::Trc20,
                    asset,
                    transaction_proof: String::new(),
                };
                self.api.deposit(&token, request).await?;
            }
            Command::SubmitKyc { actor, full_name } => {
                let token = self.token_for(&actor).await?;
                let submission = KycSubmission {
                    full_name,
                    date_of_birth: String::new(),
                    country: String::new(),
                    address: String::new(),
                    id_front_base64: String::new(),
                    id_back_base64: String::new(),
                };
                self.api.submit_kyc(&token, submission).await?;
            }
            Command::Withdraw {
                actor,
                amount,
                address,
            } => {
                let token = self.token_for(&actor).await?;
                let request = WithdrawRequest {
                    amount,
                    address,
                    asset: "USDT".to_string(),
                };
                self.api.withdraw(&token, &actor.password, request).await?;
            }
            Command::Trade {
                actor,
                pair,
                stake,
                profit,
            } => {
                let token = self.token_for(&actor).await?;
                let now = Utc::now();
                let trade = TradeResult {
                    pair,
                    direction: if profit.is_positive() {
                        Direction::Buy
                    } else {
                        Direction::Sell
                    },
                    stake,
                    commission: Amount::ZERO,
                    profit,
                    entry_price: 0.0,
                    exit_price: 0.0,
                    start_time: now,
                };
                self.api.complete_trade(&token, trade).await?;
            }
            Command::ReviewKyc {
                actor,
                target,
                decision,
            } => {
                let token = self.token_for(&actor).await?;
                let uid = self.uid_of(&target).await?;
                self.api.update_kyc_status(&token, &uid, decision).await?;
            }
            Command::ReviewDeposits {
                actor,
                target,
                decision,
            } => {
                let token = self.token_for(&actor).await?;
                let pending: Vec<(Uid, TxId)> = self
                    .api
                    .get_pending_deposits(&token)
                    .await?
                    .into_iter()
                    .filter(|p| p.user_email == target)
                    .map(|p| (p.user_id, p.transaction.id))
                    .collect();
                for (uid, tx_id) in pending {
                    self.api
                        .update_deposit_status(&token, &uid, &tx_id, decision)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn token_for(&mut self, actor: &Actor) -> Result<Token, LedgerError> {
        if let Some(token) = self.tokens.get(&actor.email) {
            return Ok(token.clone());
        }
        let (_, token) = self.api.login(&actor.email, &actor.password).await?;
        self.tokens.insert(actor.email.clone(), token.clone());
        Ok(token)
    }

    async fn uid_of(&self, email: &str) -> Result<Uid, LedgerError> {
        self.api
            .with_ledger(|ledger| {
                ledger
                    .users()
                    .find(|u| u.email == email)
                    .map(|u| u.uid.clone())
            })
            .await
            .ok_or_else(|| NotFound::TargetUser(Uid::from(email)).into())
    }
}
