//! Account ledger.
//!
//! The ledger owns the authoritative [`StoreState`] and applies one operation
//! per business event: validate, mutate the affected accounts, append
//! notifications, persist the whole store, and hand back a redacted copy of
//! the account. A rejected operation mutates nothing and persists nothing.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::model::{
    ChatMessage, DepositRequest, KycImages, KycStatus, KycSubmission, Notification, NotificationId,
    NotificationKind, Portfolio, SignupDetails, TradeResult, Transaction, TxId, TxKind, TxStatus,
    Uid, User, UserRecord, WithdrawRequest,
};
use crate::session::{self, Principal, Token};
use crate::store::{PersistentStore, StoreState};

mod admin;

mod state;

mod error;
pub use error::{ErrorKind, LedgerError, NotFound, Precondition};

const UID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UID_LEN: usize = 9;

/// The account ledger.
pub struct Ledger {
    state: StoreState,
    store: PersistentStore,
    /// Account receiving deposit and KYC alerts.
    admin_email: String,
    /// Last millisecond handed out for an id; ids stay strictly increasing.
    last_id_millis: i64,
}

/// Public API
impl Ledger {
    /// Load the store and take ownership of it.
    pub fn open(store: PersistentStore, config: &LedgerConfig) -> Self {
        let state = store.load();
        info!(accounts = state.users.len(), "ledger opened");
        Self {
            state,
            store,
            admin_email: config.admin_email.clone(),
            last_id_millis: 0,
        }
    }

    /// Persist one last time and give the store back.
    pub fn close(self) -> PersistentStore {
        self.store.save(&self.state);
        info!(accounts = self.state.users.len(), "ledger closed");
        self.store
    }

    /// Redacted view of every account, ordered by email.
    pub fn users(&self) -> impl Iterator<Item = &User> + '_ {
        self.state.users.values().map(|record| &record.user)
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn signup(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        details: SignupDetails,
    ) -> Result<(User, Token), LedgerError> {
        let result = self.apply_signup(name, email, password, details);
        Self::log_result("signup", &email, &result);
        result
    }

    pub fn login(&self, email: &str, password: &str) -> Result<(User, Token), LedgerError> {
        let result = match self.state.users.get(email) {
            Some(record) if record.password == password => {
                Ok((record.redacted(), Token::issue(&record.user.uid)))
            }
            _ => Err(LedgerError::InvalidCredentials),
        };
        Self::log_result("login", &email, &result);
        result
    }

    pub fn get_by_token(&self, token: &Token) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        self.redacted(&principal)
    }

    /// Record a pending deposit and alert the admin.
    pub fn deposit(&mut self, token: &Token, request: DepositRequest) -> Result<User, LedgerError> {
        let result = self.apply_deposit(token, request);
        Self::log_result("deposit", token, &result);
        result
    }

    /// Store identity documents and move the account to `pending` review.
    pub fn submit_kyc(
        &mut self,
        token: &Token,
        submission: KycSubmission,
    ) -> Result<User, LedgerError> {
        let result = self.apply_submit_kyc(token, submission);
        Self::log_result("kyc submission", token, &result);
        result
    }

    pub fn withdraw(
        &mut self,
        token: &Token,
        password: &str,
        request: WithdrawRequest,
    ) -> Result<User, LedgerError> {
        let result = self.apply_withdraw(token, password, request);
        Self::log_result("withdrawal", token, &result);
        result
    }

    /// Settle a finished trade whose stake the caller already debited.
    pub fn complete_trade(
        &mut self,
        token: &Token,
        trade: TradeResult,
    ) -> Result<User, LedgerError> {
        let result = self.apply_complete_trade(token, trade);
        Self::log_result("trade completion", token, &result);
        result
    }

    pub fn update_chat_history(
        &mut self,
        token: &Token,
        history: Vec<ChatMessage>,
    ) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        let record = self.record_mut(&principal)?;
        record.user.chat_history = history;
        touch(&mut record.user);
        self.persist();
        self.redacted(&principal)
    }

    pub fn mark_all_notifications_read(&mut self, token: &Token) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        let record = self.record_mut(&principal)?;
        for notification in &mut record.user.notifications {
            notification.read = true;
        }
        touch(&mut record.user);
        self.persist();
        self.redacted(&principal)
    }

    pub fn mark_notification_read(
        &mut self,
        token: &Token,
        id: &NotificationId,
    ) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        let record = self.record_mut(&principal)?;
        let notification = record
            .user
            .notifications
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| NotFound::Notification(id.clone()))?;
        notification.read = true;
        touch(&mut record.user);
        self.persist();
        self.redacted(&principal)
    }
}

/// Private API
impl Ledger {
    /// Small helper to log operation results
    fn log_result<T>(operation: &str, subject: &dyn fmt::Display, result: &Result<T, LedgerError>) {
        match result {
            Ok(_) => info!(subject = %subject, "{operation} applied"),
            Err(e) => info!(subject = %subject, reason = %e, "{operation} rejected"),
        }
    }

    fn persist(&self) {
        self.store.save(&self.state);
    }

    fn record_mut(&mut self, principal: &Principal) -> Result<&mut UserRecord, LedgerError> {
        self.state
            .users
            .get_mut(&principal.email)
            .ok_or(LedgerError::Unauthenticated)
    }

    /// Working copy of the account's portfolio. Movements are applied to the
    /// copy first and written back only once every check has passed.
    fn portfolio(&self, principal: &Principal) -> Result<Portfolio, LedgerError> {
        self.state
            .users
            .get(&principal.email)
            .map(|record| record.user.portfolio.clone())
            .ok_or(LedgerError::Unauthenticated)
    }

    fn redacted(&self, principal: &Principal) -> Result<User, LedgerError> {
        self.state
            .users
            .get(&principal.email)
            .map(UserRecord::redacted)
            .ok_or(LedgerError::Unauthenticated)
    }

    /// Next id for `prefix`, unique and ordered by generation time.
    fn next_id(&mut self, prefix: &str) -> String {
        let now = Utc::now().timestamp_millis();
        self.last_id_millis = now.max(self.last_id_millis + 1);
        format!("{prefix}-{}", self.last_id_millis)
    }

    fn notification(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        Notification {
            id: NotificationId(self.next_id("notif")),
            kind,
            title: title.into(),
            message: message.into(),
            date: Utc::now(),
            read: false,
        }
    }

    fn notify_admin(&mut self, title: &str, message: String) {
        let notification = self.notification(NotificationKind::System, title, message);
        match self.state.users.get_mut(&self.admin_email) {
            Some(admin) => {
                admin.user.notifications.insert(0, notification);
                touch(&mut admin.user);
            }
            None => debug!(admin = %self.admin_email, "no admin account to notify"),
        }
    }

    fn generate_uid(&self) -> Uid {
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..UID_LEN)
                .map(|_| UID_ALPHABET[rng.gen_range(0..UID_ALPHABET.len())] as char)
                .collect();
            let uid = Uid(format!("UID-{suffix}"));
            if self.state.find_by_uid(&uid).is_none() {
                return uid;
            }
        }
    }

    /// Create an account:
    /// - Ensure the email is not registered
    /// - Title-case each word of the display name
    /// - Zero balance, unverified KYC, fresh uid
    fn apply_signup(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        details: SignupDetails,
    ) -> Result<(User, Token), LedgerError> {
        if self.state.users.contains_key(email) {
            return Err(LedgerError::AlreadyExists);
        }

        let name = title_case(name);
        let uid = self.generate_uid();
        let record = UserRecord {
            user: User {
                uid: uid.clone(),
                email: email.to_string(),
                name: name.clone(),
                kyc_status: KycStatus::Unverified,
                portfolio: Portfolio::default(),
                transactions: Vec::new(),
                notifications: Vec::new(),
                full_name: Some(name),
                date_of_birth: Some(details.date_of_birth),
                country: Some(details.country),
                address: Some(details.address),
                photo_url: None,
                is_admin: false,
                chat_history: Vec::new(),
                version: 0,
            },
            password: password.to_string(),
        };

        let user = record.redacted();
        self.state.users.insert(email.to_string(), record);
        self.persist();
        Ok((user, Token::issue(&uid)))
    }

    /// Apply a deposit request:
    /// - Amount must be positive and fit the pending balance
    /// - Prepend a `Pending` deposit and raise the pending balance
    /// - Alert the admin account
    fn apply_deposit(
        &mut self,
        token: &Token,
        request: DepositRequest,
    ) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        if !request.amount.is_positive() {
            return Err(Precondition::InvalidAmount(request.amount).into());
        }
        let mut portfolio = self.portfolio(&principal)?;
        portfolio.acknowledge_pending(request.amount)?;

        let transaction = Transaction {
            id: TxId(self.next_id("tx")),
            asset: request.asset.clone(),
            amount: request.amount,
            status: TxStatus::Pending,
            date: Utc::now(),
            kind: TxKind::Deposit {
                network: Some(request.network),
                transaction_proof: Some(request.transaction_proof),
            },
        };

        let record = self.record_mut(&principal)?;
        record.user.transactions.insert(0, transaction);
        record.user.portfolio = portfolio;
        touch(&mut record.user);

        let message = format!(
            "{} has submitted a new deposit of {:.2} {}.",
            record.user.name, request.amount, request.asset
        );
        self.notify_admin("New Deposit Request", message);

        self.persist();
        self.redacted(&principal)
    }

    fn apply_submit_kyc(
        &mut self,
        token: &Token,
        submission: KycSubmission,
    ) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;

        let record = self.record_mut(&principal)?;
        record.user.full_name = Some(submission.full_name);
        record.user.date_of_birth = Some(submission.date_of_birth);
        record.user.country = Some(submission.country);
        record.user.address = Some(submission.address);
        record.user.kyc_status = KycStatus::Pending;
        touch(&mut record.user);
        let message = format!(
            "{} has submitted documents for KYC verification.",
            record.user.name
        );

        self.state.kyc_images.insert(
            principal.uid.clone(),
            KycImages {
                id_front: submission.id_front_base64,
                id_back: submission.id_back_base64,
            },
        );
        self.notify_admin("New KYC Submission", message);

        self.persist();
        self.redacted(&principal)
    }

    /// Apply a withdrawal:
    /// - Re-check the password
    /// - Require verified KYC
    /// - Ensure a positive amount within the available balance
    /// - Debit, record a `Completed` withdrawal, notify the user
    fn apply_withdraw(
        &mut self,
        token: &Token,
        password: &str,
        request: WithdrawRequest,
    ) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        {
            let record = self.record_mut(&principal)?;
            if record.password != password {
                return Err(Precondition::IncorrectPassword.into());
            }
            if record.user.kyc_status != KycStatus::Verified {
                return Err(Precondition::KycRequired.into());
            }
            if !request.amount.is_positive() {
                return Err(Precondition::InvalidAmount(request.amount).into());
            }
            let available = record.user.portfolio.balance;
            if available < request.amount {
                return Err(Precondition::InsufficientBalance {
                    available,
                    requested: request.amount,
                }
                .into());
            }
        }
        let mut portfolio = self.portfolio(&principal)?;
        portfolio.debit(request.amount)?;

        let transaction = Transaction {
            id: TxId(self.next_id("tx")),
            asset: request.asset.clone(),
            amount: request.amount,
            status: TxStatus::Completed,
            date: Utc::now(),
            kind: TxKind::Withdrawal {
                address: request.address,
            },
        };
        let notification = self.notification(
            NotificationKind::Transaction,
            "Withdrawal Processed",
            format!(
                "Your withdrawal of {:.2} {} has been processed successfully.",
                request.amount, request.asset
            ),
        );

        let record = self.record_mut(&principal)?;
        record.user.portfolio = portfolio;
        record.user.transactions.insert(0, transaction);
        record.user.notifications.insert(0, notification);
        touch(&mut record.user);

        self.persist();
        self.redacted(&principal)
    }

    /// Apply a trade outcome:
    /// - Win: credit stake plus profit back (the stake was debited up front)
    /// - Loss: nothing to credit, the stake is forfeited
    /// - Record the signed PNL as a `Completed` trade and notify the user
    fn apply_complete_trade(
        &mut self,
        token: &Token,
        trade: TradeResult,
    ) -> Result<User, LedgerError> {
        let principal = session::authenticate(&self.state, token)?;
        if !trade.stake.is_positive() {
            return Err(Precondition::InvalidAmount(trade.stake).into());
        }

        let is_win = trade.profit.is_positive();
        let mut portfolio = self.portfolio(&principal)?;
        if is_win {
            let payout = trade
                .stake
                .checked_add(trade.profit)
                .ok_or(Precondition::InvalidAmount(trade.profit))?;
            portfolio.credit(payout)?;
        }
        let asset = trade
            .pair
            .split('-')
            .nth(1)
            .filter(|quote| !quote.is_empty())
            .unwrap_or("USDT")
            .to_string();

        let (title, message) = if is_win {
            (
                "Trade Completed: Win",
                format!(
                    "Your {} trade on {} was successful, with a profit of ${:.2}.",
                    trade.direction, trade.pair, trade.profit
                ),
            )
        } else {
            (
                "Trade Completed: Loss",
                format!(
                    "Your {} trade on {} resulted in a loss of ${:.2}.",
                    trade.direction, trade.pair, trade.stake
                ),
            )
        };

        let transaction = Transaction {
            id: TxId(self.next_id("trade")),
            asset,
            amount: trade.profit,
            status: TxStatus::Completed,
            date: trade.start_time,
            kind: TxKind::Trade {
                pair: trade.pair,
                direction: trade.direction,
                stake: trade.stake,
                commission: trade.commission,
                entry_price: trade.entry_price,
                exit_price: trade.exit_price,
                end_time: Utc::now(),
            },
        };
        let notification = self.notification(NotificationKind::Transaction, title, message);

        let record = self.record_mut(&principal)?;
        record.user.portfolio = portfolio;
        record.user.transactions.insert(0, transaction);
        record.user.notifications.insert(0, notification);
        touch(&mut record.user);

        self.persist();
        self.redacted(&principal)
    }
}

/// Uppercase the first character of every space-separated word.
fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn touch(user: &mut User) {
    user.version += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::{ChatRole, Direction, Network};
    use crate::store::{KeyValueStore, MemoryStorage};
    use std::sync::Arc;

    const KEY: &str = "cryptoPulseDB";

    // test utils

    pub(super) fn ledger() -> (Ledger, Arc<MemoryStorage>) {
        let backend = Arc::new(MemoryStorage::new());
        let store = PersistentStore::new(backend.clone(), KEY);
        (Ledger::open(store, &LedgerConfig::default()), backend)
    }

    pub(super) fn details() -> SignupDetails {
        SignupDetails {
            date_of_birth: "1990-01-01".to_string(),
            country: "NZ".to_string(),
            address: "1 Queen St".to_string(),
        }
    }

    pub(super) fn deposit_of(amount: f64) -> DepositRequest {
        DepositRequest {
            amount: Amount::from_float(amount),
            network: Network::Trc20,
            asset: "USDT".to_string(),
            transaction_proof: "data:image/png;base64,AAAA".to_string(),
        }
    }

    fn withdrawal_of(amount: f64) -> WithdrawRequest {
        WithdrawRequest {
            amount: Amount::from_float(amount),
            address: "TXYZ".to_string(),
            asset: "USDT".to_string(),
        }
    }

    fn trade(stake: f64, profit: f64) -> TradeResult {
        TradeResult {
            pair: "BTC-USDT".to_string(),
            direction: Direction::Buy,
            stake: Amount::from_float(stake),
            commission: Amount::from_float(stake * 0.02),
            profit: Amount::from_float(profit),
            entry_price: 64_000.0,
            exit_price: 64_100.0,
            start_time: Utc::now(),
        }
    }

    fn persisted(backend: &MemoryStorage) -> Option<String> {
        backend.get(KEY).unwrap()
    }

    fn leng() -> Token {
        Token::from("TOKEN_10221")
    }

    fn alex() -> Token {
        Token::from("TOKEN_UID-TESTUSER")
    }

    // Signup / login

    #[test]
    fn signup_creates_empty_unverified_account() {
        let (mut ledger, backend) = ledger();
        let (user, token) = ledger
            .signup("alex j", "a@x.com", "pw", details())
            .unwrap();

        assert_eq!(user.name, "Alex J");
        assert_eq!(user.full_name.as_deref(), Some("Alex J"));
        assert_eq!(user.kyc_status, KycStatus::Unverified);
        assert_eq!(user.portfolio, Portfolio::default());
        assert!(user.uid.as_str().starts_with("UID-"));
        assert_eq!(user.uid.as_str().len(), 4 + UID_LEN);
        assert_eq!(token.resolve(), Some(user.uid.clone()));

        // persisted with the credential
        let stored = persisted(&backend).unwrap();
        assert!(stored.contains("a@x.com"));
    }

    #[test]
    fn signup_uids_do_not_collide() {
        let (mut ledger, _) = ledger();
        let mut uids = std::collections::HashSet::new();
        for i in 0..50 {
            let (user, _) = ledger
                .signup("user", &format!("u{i}@x.com"), "pw", details())
                .unwrap();
            assert!(uids.insert(user.uid));
        }
        assert_eq!(ledger.users().count(), 53);
    }

    #[test]
    fn signup_duplicate_email_fails() {
        let (mut ledger, backend) = ledger();
        let err = ledger
            .signup("x", "alex@test.com", "pw", details())
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyExists);
        assert!(persisted(&backend).is_none());
    }

    #[test]
    fn signup_then_login_resolves_to_same_account() {
        let (mut ledger, _) = ledger();
        let (created, _) = ledger
            .signup("alex j", "a@x.com", "pw", details())
            .unwrap();

        let (user, token) = ledger.login("a@x.com", "pw").unwrap();
        assert_eq!(user.uid, created.uid);
        assert_eq!(ledger.get_by_token(&token).unwrap().email, "a@x.com");
    }

    #[test]
    fn login_requires_exact_password() {
        let (ledger, _) = ledger();
        for attempt in ["", "password", "password1234", "PASSWORD123", " password123"] {
            assert_eq!(
                ledger.login("alex@test.com", attempt).unwrap_err(),
                LedgerError::InvalidCredentials
            );
        }
        assert_eq!(
            ledger.login("nobody@test.com", "password123").unwrap_err(),
            LedgerError::InvalidCredentials
        );
        assert!(ledger.login("alex@test.com", "password123").is_ok());
    }

    #[test]
    fn get_by_token_rejects_unknown_token() {
        let (ledger, _) = ledger();
        assert_eq!(
            ledger.get_by_token(&Token::from("TOKEN_missing")).unwrap_err(),
            LedgerError::Unauthenticated
        );
    }

    #[test]
    fn title_case_only_touches_first_letters() {
        assert_eq!(title_case("alex j"), "Alex J");
        assert_eq!(title_case("mcDonald  o'neil"), "McDonald  O'neil");
        assert_eq!(title_case(""), "");
    }

    // Deposit

    #[test]
    fn deposit_adds_pending_transaction_and_alerts_admin() {
        let (mut ledger, backend) = ledger();
        let user = ledger.deposit(&alex(), deposit_of(100.0)).unwrap();

        assert_eq!(user.portfolio.pending_balance, Amount::from_float(100.0));
        assert_eq!(user.portfolio.balance, Amount::from_float(50_000.0));
        let tx = &user.transactions[0];
        assert!(tx.is_pending_deposit());
        assert!(tx.id.as_str().starts_with("tx-"));

        let admin = &ledger.state().users["admin@cryptopulse.com"].user;
        assert_eq!(admin.notifications[0].title, "New Deposit Request");
        assert_eq!(
            admin.notifications[0].message,
            "Alex Johnson has submitted a new deposit of 100.00 USDT."
        );
        assert!(persisted(&backend).is_some());
    }

    #[test]
    fn deposit_requires_positive_amount() {
        let (mut ledger, backend) = ledger();
        let err = ledger.deposit(&alex(), deposit_of(0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(persisted(&backend).is_none());
    }

    #[test]
    fn overflowing_deposit_is_rejected_without_side_effects() {
        let (mut ledger, backend) = ledger();
        ledger.deposit(&alex(), deposit_of(9.0e14)).unwrap();
        let before = ledger.get_by_token(&alex()).unwrap();
        let stored = persisted(&backend);

        let err = ledger.deposit(&alex(), deposit_of(9.0e14)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::PreconditionFailed(Precondition::InvalidAmount(Amount::from_float(
                9.0e14
            )))
        );
        assert_eq!(ledger.get_by_token(&alex()).unwrap(), before);
        assert_eq!(persisted(&backend), stored);
    }

    #[test]
    fn overflowing_trade_payout_is_rejected_without_side_effects() {
        let (mut ledger, backend) = ledger();
        let before = ledger.get_by_token(&leng()).unwrap();
        let stored = persisted(&backend);

        let mut result = trade(100.0, 1.0);
        result.profit = Amount::from_scaled(i64::MAX - 1);
        let err = ledger.complete_trade(&leng(), result).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(ledger.get_by_token(&leng()).unwrap(), before);
        assert_eq!(persisted(&backend), stored);
    }

    #[test]
    fn deposit_requires_authentication() {
        let (mut ledger, _) = ledger();
        let err = ledger
            .deposit(&Token::from("TOKEN_nobody"), deposit_of(10.0))
            .unwrap_err();
        assert_eq!(err, LedgerError::Unauthenticated);
    }

    #[test]
    fn back_to_back_deposits_get_distinct_ordered_ids() {
        let (mut ledger, _) = ledger();
        ledger.deposit(&alex(), deposit_of(1.0)).unwrap();
        let user = ledger.deposit(&alex(), deposit_of(2.0)).unwrap();

        let newest = &user.transactions[0];
        let older = &user.transactions[1];
        assert_ne!(newest.id, older.id);
        assert_eq!(newest.amount, Amount::from_float(2.0));
        let millis = |id: &TxId| id.as_str()[3..].parse::<i64>().unwrap();
        assert!(millis(&newest.id) > millis(&older.id));
    }

    // KYC

    #[test]
    fn submit_kyc_sets_pending_and_stores_images() {
        let (mut ledger, _) = ledger();
        let user = ledger
            .submit_kyc(
                &alex(),
                KycSubmission {
                    full_name: "Alex Q Johnson".to_string(),
                    date_of_birth: "1990-01-01".to_string(),
                    country: "NZ".to_string(),
                    address: "2 Queen St".to_string(),
                    id_front_base64: "front".to_string(),
                    id_back_base64: "back".to_string(),
                },
            )
            .unwrap();

        assert_eq!(user.kyc_status, KycStatus::Pending);
        assert_eq!(user.full_name.as_deref(), Some("Alex Q Johnson"));
        assert_eq!(
            ledger.state().kyc_images[&Uid::from("UID-TESTUSER")].id_back,
            "back"
        );
        let admin = &ledger.state().users["admin@cryptopulse.com"].user;
        assert_eq!(admin.notifications[0].title, "New KYC Submission");
    }

    // Withdrawal

    #[test]
    fn withdraw_debits_and_records_completed_transaction() {
        let (mut ledger, _) = ledger();
        let user = ledger
            .withdraw(&leng(), "123456", withdrawal_of(1000.0))
            .unwrap();

        assert_eq!(user.portfolio.balance, Amount::from_float(4000.0));
        let tx = &user.transactions[0];
        assert_eq!(tx.status, TxStatus::Completed);
        assert_eq!(
            tx.kind,
            TxKind::Withdrawal {
                address: "TXYZ".to_string()
            }
        );
        assert_eq!(user.notifications[0].title, "Withdrawal Processed");
    }

    #[test]
    fn withdraw_exact_balance_succeeds() {
        let (mut ledger, _) = ledger();
        let user = ledger
            .withdraw(&leng(), "123456", withdrawal_of(5000.0))
            .unwrap();
        assert_eq!(user.portfolio.balance, Amount::ZERO);
    }

    #[test]
    fn withdraw_requires_verified_kyc_regardless_of_balance() {
        let (mut ledger, backend) = ledger();
        // alex holds 50,000 but is unverified
        let err = ledger
            .withdraw(&alex(), "password123", withdrawal_of(1.0))
            .unwrap_err();
        assert_eq!(err, LedgerError::PreconditionFailed(Precondition::KycRequired));
        assert!(persisted(&backend).is_none());
    }

    #[test]
    fn withdraw_rechecks_password() {
        let (mut ledger, _) = ledger();
        let err = ledger
            .withdraw(&leng(), "wrong", withdrawal_of(1.0))
            .unwrap_err();
        assert_eq!(err.to_string(), "Incorrect password.");
    }

    #[test]
    fn withdraw_insufficient_balance_leaves_state_untouched() {
        let (mut ledger, backend) = ledger();
        let before = ledger.get_by_token(&leng()).unwrap();
        let stored = persisted(&backend);

        let err = ledger
            .withdraw(&leng(), "123456", withdrawal_of(5000.01))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PreconditionFailed(Precondition::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.get_by_token(&leng()).unwrap(), before);
        assert_eq!(persisted(&backend), stored);
    }

    // Trades

    #[test]
    fn winning_trade_credits_stake_plus_profit() {
        let (mut ledger, _) = ledger();
        let user = ledger.complete_trade(&leng(), trade(100.0, 85.0)).unwrap();

        assert_eq!(user.portfolio.balance, Amount::from_float(5185.0));
        let tx = &user.transactions[0];
        assert_eq!(tx.amount, Amount::from_float(85.0));
        assert_eq!(tx.asset, "USDT");
        assert!(tx.id.as_str().starts_with("trade-"));
        assert_eq!(user.notifications[0].title, "Trade Completed: Win");
        assert_eq!(
            user.notifications[0].message,
            "Your Buy trade on BTC-USDT was successful, with a profit of $85.00."
        );
    }

    #[test]
    fn full_loss_records_negative_pnl_without_credit() {
        let (mut ledger, _) = ledger();
        let user = ledger.complete_trade(&leng(), trade(100.0, -100.0)).unwrap();

        assert_eq!(user.portfolio.balance, Amount::from_float(5000.0));
        assert_eq!(user.transactions[0].amount, Amount::from_float(-100.0));
        assert_eq!(user.notifications[0].title, "Trade Completed: Loss");
        assert_eq!(
            user.notifications[0].message,
            "Your Buy trade on BTC-USDT resulted in a loss of $100.00."
        );
    }

    #[test]
    fn break_even_trade_counts_as_loss() {
        let (mut ledger, _) = ledger();
        let user = ledger.complete_trade(&leng(), trade(100.0, 0.0)).unwrap();
        assert_eq!(user.portfolio.balance, Amount::from_float(5000.0));
    }

    #[test]
    fn trade_asset_defaults_without_quote() {
        let (mut ledger, _) = ledger();
        let mut result = trade(10.0, 1.0);
        result.pair = "BTC".to_string();
        let user = ledger.complete_trade(&leng(), result).unwrap();
        assert_eq!(user.transactions[0].asset, "USDT");
    }

    // Chat and notifications

    #[test]
    fn chat_history_is_replaced() {
        let (mut ledger, _) = ledger();
        let user = ledger
            .update_chat_history(&alex(), vec![ChatMessage::new(ChatRole::User, "hello")])
            .unwrap();
        assert_eq!(user.chat_history.len(), 1);
    }

    #[test]
    fn mark_all_notifications_read() {
        let (mut ledger, _) = ledger();
        let user = ledger.mark_all_notifications_read(&alex()).unwrap();
        assert_eq!(user.unread_notifications(), 0);
        assert_eq!(user.notifications.len(), 3);
    }

    #[test]
    fn mark_single_notification_read() {
        let (mut ledger, _) = ledger();
        let user = ledger
            .mark_notification_read(&alex(), &NotificationId::from("notif1"))
            .unwrap();
        assert!(user.notifications[0].read);
        assert!(!user.notifications[1].read);
    }

    #[test]
    fn mark_unknown_notification_fails_without_persisting() {
        let (mut ledger, backend) = ledger();
        let err = ledger
            .mark_notification_read(&alex(), &NotificationId::from("nope"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(persisted(&backend).is_none());
    }

    // Versions and persistence

    #[test]
    fn every_mutation_bumps_version() {
        let (mut ledger, _) = ledger();
        let v0 = ledger.get_by_token(&alex()).unwrap().version;
        ledger.deposit(&alex(), deposit_of(1.0)).unwrap();
        let v1 = ledger.mark_all_notifications_read(&alex()).unwrap().version;
        assert_eq!(v1, v0 + 2);
    }

    #[test]
    fn mutations_survive_reopen() {
        let (mut ledger, backend) = ledger();
        ledger.deposit(&alex(), deposit_of(42.0)).unwrap();
        let store = ledger.close();

        let reopened = Ledger::open(store, &LedgerConfig::default());
        let snapshot = reopened.get_by_token(&alex()).unwrap();
        assert_eq!(snapshot.portfolio.pending_balance, Amount::from_float(42.0));
        assert!(persisted(&backend).unwrap().contains("\"password\""));
    }

    #[test]
    fn redacted_snapshots_never_carry_password() {
        let (mut ledger, _) = ledger();
        let user = ledger.deposit(&alex(), deposit_of(1.0)).unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password123"));
    }
}
