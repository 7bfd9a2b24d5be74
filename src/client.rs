//! Client-side application state.
//!
//! [`Client`] caches the signed-in account and routes every change through
//! the [`Api`]. Views observe [`ClientState`] through a watch channel, which
//! is how they see the loading flag flip while a call is in flight.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, warn};

use crate::Amount;
use crate::api::{Api, ApiResult};
use crate::config::LedgerConfig;
use crate::ledger::{LedgerError, Precondition};
use crate::model::{
    ChatMessage, DepositDecision, DepositRequest, KycDecision, KycRequest, KycSubmission,
    NotificationId, PendingDeposit, SignupDetails, TradeResult, TxId, Uid, User, WithdrawRequest,
};
use crate::session::Token;
use crate::store::KeyValueStore;

/// What the views render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    pub user: Option<User>,
    pub is_loading: bool,
    pub is_admin: bool,
    pub is_initialized: bool,
}

impl ClientState {
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// Shallow merge of a ledger snapshot into the held account.
    ///
    /// Local-only fields (the avatar) survive. A snapshot older than the held
    /// copy is dropped.
    fn merge(&mut self, snapshot: User) {
        let same_account = self
            .user
            .as_ref()
            .is_some_and(|held| held.uid == snapshot.uid);

        match &mut self.user {
            Some(held) if same_account => {
                if snapshot.version < held.version {
                    warn!(
                        uid = %snapshot.uid,
                        held = held.version,
                        snapshot = snapshot.version,
                        "discarding stale account snapshot"
                    );
                    return;
                }
                let photo_url = snapshot.photo_url.clone().or_else(|| held.photo_url.take());
                *held = User {
                    photo_url,
                    ..snapshot
                };
            }
            slot => *slot = Some(snapshot),
        }
        self.is_admin = self.user.as_ref().is_some_and(|u| u.is_admin);
    }
}

pub struct Client {
    api: Api,
    storage: Arc<dyn KeyValueStore>,
    config: LedgerConfig,
    token: Option<Token>,
    state: watch::Sender<ClientState>,
}

/// Public API
impl Client {
    pub fn new(api: Api, storage: Arc<dyn KeyValueStore>, config: LedgerConfig) -> Self {
        let (state, _) = watch::channel(ClientState::default());
        Self {
            api,
            storage,
            config,
            token: None,
            state,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Restore the session from the stored token. Always ends initialized;
    /// a token that no longer resolves is discarded.
    pub async fn init(&mut self) {
        let stored = match self.storage.get(&self.config.token_key) {
            Ok(stored) => stored.map(Token::from),
            Err(e) => {
                error!(error = %e, "failed to read stored session token");
                None
            }
        };

        if let Some(token) = stored {
            match self.api.get_user_by_token(&token).await {
                Ok(user) => self.start_session(user, token, false),
                Err(e) => {
                    warn!(error = %e, "session rehydration failed");
                    self.forget_token();
                }
            }
        }

        self.state.send_modify(|s| s.is_initialized = true);
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), LedgerError> {
        self.set_loading(true);
        let result = self.api.login(email, password).await;
        self.set_loading(false);

        let (user, token) = result.inspect_err(|e| warn!(error = %e, "login failed"))?;
        self.start_session(user, token, true);
        Ok(())
    }

    pub async fn signup(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        details: SignupDetails,
    ) -> Result<(), LedgerError> {
        self.set_loading(true);
        let result = self.api.signup(name, email, password, details).await;
        self.set_loading(false);

        let (user, token) = result.inspect_err(|e| warn!(error = %e, "signup failed"))?;
        self.start_session(user, token, true);
        Ok(())
    }

    /// Drop the session locally; the token stays valid on the ledger side.
    pub fn logout(&mut self) {
        self.token = None;
        self.forget_token();
        self.state.send_modify(|s| {
            s.user = None;
            s.is_admin = false;
        });
    }

    pub async fn deposit(&mut self, request: DepositRequest) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        self.sync("deposit", true, async move { api.deposit(&token, request).await })
            .await
    }

    pub async fn submit_kyc(&mut self, submission: KycSubmission) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        self.sync("kyc submission", true, async move {
            api.submit_kyc(&token, submission).await
        })
        .await
    }

    pub async fn withdraw(
        &mut self,
        password: &str,
        request: WithdrawRequest,
    ) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        let password = password.to_string();
        self.sync("withdrawal", true, async move {
            api.withdraw(&token, &password, request).await
        })
        .await
    }

    /// Debit stake and commission from the held balance when a trade opens.
    ///
    /// Only the local copy changes; [`Client::complete_trade`] settles with
    /// the ledger.
    pub fn open_trade(&mut self, stake: Amount, commission: Amount) -> Result<(), LedgerError> {
        if self.token.is_none() {
            return Err(LedgerError::Unauthenticated);
        }
        if !stake.is_positive() {
            return Err(Precondition::InvalidAmount(stake).into());
        }

        let required = stake
            .checked_add(commission)
            .ok_or(Precondition::InvalidAmount(commission))?;
        let mut result = Ok(());
        self.state.send_modify(|s| match &mut s.user {
            Some(user) if user.portfolio.balance >= required => {
                result = user.portfolio.debit(required).map_err(LedgerError::from);
            }
            Some(user) => {
                result = Err(Precondition::InsufficientForStake {
                    available: user.portfolio.balance,
                    required,
                }
                .into());
            }
            None => result = Err(LedgerError::Unauthenticated),
        });
        result
    }

    pub async fn complete_trade(&mut self, trade: TradeResult) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        self.sync("trade completion", false, async move {
            api.complete_trade(&token, trade).await
        })
        .await
    }

    pub async fn update_chat_history(
        &mut self,
        history: Vec<ChatMessage>,
    ) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        self.sync("chat update", false, async move {
            api.update_chat_history(&token, history).await
        })
        .await
    }

    pub async fn mark_all_notifications_read(&mut self) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        self.sync("mark all read", true, async move {
            api.mark_all_notifications_read(&token).await
        })
        .await
    }

    pub async fn mark_notification_read(&mut self, id: &NotificationId) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        let id = id.clone();
        self.sync("mark read", false, async move {
            api.mark_notification_read(&token, &id).await
        })
        .await
    }

    /// Store an avatar data URL for the signed-in account.
    ///
    /// The loading flag is raised for the duration of the write.
    pub fn update_user_photo(&mut self, data_url: &str) -> Result<(), LedgerError> {
        let uid = self
            .state
            .borrow()
            .user
            .as_ref()
            .map(|u| u.uid.clone())
            .ok_or(LedgerError::Unauthenticated)?;

        self.set_loading(true);
        if let Err(e) = self.storage.set(&self.config.photo_key(&uid), data_url) {
            error!(uid = %uid, error = %e, "failed to persist avatar");
        }
        self.state.send_modify(|s| {
            if let Some(user) = &mut s.user {
                user.photo_url = Some(data_url.to_string());
            }
            s.is_loading = false;
        });
        Ok(())
    }

    pub async fn fetch_all_users(&self) -> Result<Vec<User>, LedgerError> {
        let (api, token) = self.session()?;
        api.get_all_users(&token).await
    }

    pub async fn fetch_pending_kyc(&self) -> Result<Vec<KycRequest>, LedgerError> {
        let (api, token) = self.session()?;
        api.get_pending_kyc(&token).await
    }

    pub async fn update_kyc_status(
        &self,
        target: &Uid,
        decision: KycDecision,
    ) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        api.update_kyc_status(&token, target, decision).await?;
        Ok(())
    }

    pub async fn fetch_pending_deposits(&self) -> Result<Vec<PendingDeposit>, LedgerError> {
        let (api, token) = self.session()?;
        api.get_pending_deposits(&token).await
    }

    pub async fn update_deposit_status(
        &self,
        target: &Uid,
        tx_id: &TxId,
        decision: DepositDecision,
    ) -> Result<(), LedgerError> {
        let (api, token) = self.session()?;
        api.update_deposit_status(&token, target, tx_id, decision)
            .await?;
        Ok(())
    }
}

/// Private API
impl Client {
    fn session(&self) -> Result<(Api, Token), LedgerError> {
        let token = self.token.clone().ok_or(LedgerError::Unauthenticated)?;
        Ok((self.api.clone(), token))
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.is_loading = loading);
    }

    fn forget_token(&self) {
        if let Err(e) = self.storage.remove(&self.config.token_key) {
            error!(error = %e, "failed to remove stored session token");
        }
    }

    fn stored_photo(&self, uid: &Uid) -> Option<String> {
        self.storage
            .get(&self.config.photo_key(uid))
            .inspect_err(|e| error!(uid = %uid, error = %e, "failed to read avatar"))
            .ok()
            .flatten()
    }

    fn start_session(&mut self, mut user: User, token: Token, remember: bool) {
        if let Some(photo) = self.stored_photo(&user.uid) {
            user.photo_url = Some(photo);
        }
        if remember {
            if let Err(e) = self.storage.set(&self.config.token_key, token.as_str()) {
                error!(error = %e, "failed to persist session token");
            }
        }
        self.token = Some(token);
        self.state.send_modify(|s| {
            s.is_admin = user.is_admin;
            s.user = Some(user);
        });
    }

    /// Await a ledger call and merge the returned account into the state.
    async fn sync<F>(
        &mut self,
        operation: &str,
        track_loading: bool,
        call: F,
    ) -> Result<(), LedgerError>
    where
        F: Future<Output = ApiResult<User>>,
    {
        if track_loading {
            self.set_loading(true);
        }
        let result = call.await;
        if track_loading {
            self.set_loading(false);
        }

        match result {
            Ok(user) => {
                self.state.send_modify(|s| s.merge(user));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "{operation} failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Latency;
    use crate::ledger::{ErrorKind, Ledger};
    use crate::model::{Direction, Network};
    use crate::store::{MemoryStorage, PersistentStore};
    use chrono::Utc;
    use std::time::Duration;

    fn setup(latency: Latency) -> (Client, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let config = LedgerConfig::default();
        let store = PersistentStore::new(storage.clone(), config.db_key.clone());
        let api = Api::new(Ledger::open(store, &config), latency);
        (Client::new(api, storage.clone(), config), storage)
    }

    fn deposit_of(amount: f64) -> DepositRequest {
        DepositRequest {
            amount: Amount::from_float(amount),
            network: Network::Btc,
            asset: "USDT".to_string(),
            transaction_proof: "proof".to_string(),
        }
    }

    fn trade(stake: f64, profit: f64) -> TradeResult {
        TradeResult {
            pair: "ETH-USDT".to_string(),
            direction: Direction::Sell,
            stake: Amount::from_float(stake),
            commission: Amount::ZERO,
            profit: Amount::from_float(profit),
            entry_price: 3000.0,
            exit_price: 2990.0,
            start_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn init_without_token_just_initializes() {
        let (mut client, _) = setup(Latency::none());
        assert!(!client.state().is_initialized);
        client.init().await;

        let state = client.state();
        assert!(state.is_initialized);
        assert!(!state.is_logged_in());
    }

    #[tokio::test]
    async fn login_persists_token_and_rehydrates() {
        let (mut client, storage) = setup(Latency::none());
        client.login("alex@test.com", "password123").await.unwrap();
        assert_eq!(
            storage.get("cryptoPulseAuthToken").unwrap().as_deref(),
            Some("TOKEN_UID-TESTUSER")
        );

        // a fresh client over the same storage picks the session back up
        let api = client.api.clone();
        let mut fresh = Client::new(api, storage.clone(), LedgerConfig::default());
        fresh.init().await;
        let state = fresh.state();
        assert!(state.is_initialized);
        assert_eq!(state.user.unwrap().email, "alex@test.com");
        assert!(!state.is_admin);
    }

    #[tokio::test]
    async fn init_discards_invalid_token() {
        let (mut client, storage) = setup(Latency::none());
        storage.set("cryptoPulseAuthToken", "TOKEN_UID-GONE").unwrap();

        client.init().await;
        assert!(client.state().is_initialized);
        assert!(!client.state().is_logged_in());
        assert_eq!(storage.get("cryptoPulseAuthToken").unwrap(), None);
    }

    #[tokio::test]
    async fn login_failure_is_propagated_verbatim() {
        let (mut client, _) = setup(Latency::none());
        let err = client.login("alex@test.com", "bad").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials.");
        assert!(!client.state().is_loading);
    }

    #[tokio::test]
    async fn admin_flag_follows_account() {
        let (mut client, _) = setup(Latency::none());
        client.login("admin@cryptopulse.com", "admin").await.unwrap();
        assert!(client.state().is_admin);
        assert_eq!(client.fetch_all_users().await.unwrap().len(), 3);

        client.logout();
        assert!(!client.state().is_admin);
        assert!(!client.state().is_logged_in());
    }

    #[tokio::test]
    async fn mutations_require_a_session() {
        let (mut client, _) = setup(Latency::none());
        let err = client.deposit(deposit_of(1.0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            client.update_user_photo("data:").unwrap_err(),
            LedgerError::Unauthenticated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn loading_flag_is_visible_while_in_flight() {
        let (mut client, _) = setup(Latency::default());
        client.login("alex@test.com", "password123").await.unwrap();
        let mut rx = client.subscribe();

        let handle = tokio::spawn(async move {
            client.deposit(deposit_of(5.0)).await.unwrap();
            client
        });

        rx.wait_for(|s| s.is_loading).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let client = handle.await.unwrap();
        assert!(!client.state().is_loading);
        assert_eq!(
            client.state().user.unwrap().portfolio.pending_balance,
            Amount::from_float(5.0)
        );
    }

    #[tokio::test]
    async fn merge_keeps_local_avatar() {
        let (mut client, storage) = setup(Latency::none());
        client.login("alex@test.com", "password123").await.unwrap();
        client.update_user_photo("data:image/png;base64,AAA").unwrap();
        assert_eq!(
            storage.get("cryptoPulsePhoto-UID-TESTUSER").unwrap().as_deref(),
            Some("data:image/png;base64,AAA")
        );

        client.mark_all_notifications_read().await.unwrap();
        let user = client.state().user.unwrap();
        assert_eq!(user.unread_notifications(), 0);
        assert_eq!(user.photo_url.as_deref(), Some("data:image/png;base64,AAA"));

        // avatar is re-attached on the next login
        client.logout();
        client.login("alex@test.com", "password123").await.unwrap();
        assert!(client.state().user.unwrap().photo_url.is_some());
    }

    /// Records the façade's loading flag at the moment an avatar is written.
    #[derive(Default)]
    struct RecordingStorage {
        inner: MemoryStorage,
        observer: std::sync::Mutex<Option<watch::Receiver<ClientState>>>,
        loading_at_write: std::sync::Mutex<Vec<bool>>,
    }

    impl KeyValueStore for RecordingStorage {
        fn get(&self, key: &str) -> Result<Option<String>, crate::store::StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), crate::store::StorageError> {
            if key.starts_with("cryptoPulsePhoto-") {
                if let Some(rx) = self.observer.lock().unwrap().as_ref() {
                    self.loading_at_write
                        .lock()
                        .unwrap()
                        .push(rx.borrow().is_loading);
                }
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), crate::store::StorageError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn photo_update_raises_loading_during_write() {
        let storage = Arc::new(RecordingStorage::default());
        let config = LedgerConfig::default();
        let store = PersistentStore::new(Arc::new(MemoryStorage::new()), config.db_key.clone());
        let api = Api::new(Ledger::open(store, &config), Latency::none());
        let mut client = Client::new(api, storage.clone(), config);
        client.login("alex@test.com", "password123").await.unwrap();
        *storage.observer.lock().unwrap() = Some(client.subscribe());

        client.update_user_photo("data:image/png;base64,BBB").unwrap();

        assert_eq!(*storage.loading_at_write.lock().unwrap(), vec![true]);
        let state = client.state();
        assert!(!state.is_loading);
        assert_eq!(
            state.user.unwrap().photo_url.as_deref(),
            Some("data:image/png;base64,BBB")
        );
    }

    #[test]
    fn stale_snapshots_are_discarded() {
        let mut state = ClientState::default();
        let mut newer = crate::store::StoreState::seeded().users["alex@test.com"].redacted();
        newer.version = 5;
        let mut older = newer.clone();
        older.version = 4;
        older.portfolio.balance = Amount::ZERO;

        state.merge(newer.clone());
        state.merge(older);
        assert_eq!(state.user.as_ref().unwrap().portfolio, newer.portfolio);
    }

    #[tokio::test]
    async fn open_trade_predebits_until_ledger_settles() {
        let (mut client, _) = setup(Latency::none());
        client
            .login("Lengmelina1996@yahoo.com", "123456")
            .await
            .unwrap();

        client
            .open_trade(Amount::from_float(100.0), Amount::from_float(2.0))
            .unwrap();
        assert_eq!(
            client.state().user.unwrap().portfolio.balance,
            Amount::from_float(4898.0)
        );

        client.complete_trade(trade(100.0, 80.0)).await.unwrap();
        let user = client.state().user.unwrap();
        assert_eq!(user.portfolio.balance, Amount::from_float(5180.0));
        assert_eq!(user.transactions[0].amount, Amount::from_float(80.0));
    }

    #[tokio::test]
    async fn open_trade_checks_balance() {
        let (mut client, _) = setup(Latency::none());
        client
            .login("Lengmelina1996@yahoo.com", "123456")
            .await
            .unwrap();

        let err = client
            .open_trade(Amount::from_float(5000.0), Amount::from_float(1.0))
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient balance to cover stake and fee.");
        assert_eq!(
            client.state().user.unwrap().portfolio.balance,
            Amount::from_float(5000.0)
        );
    }

    #[tokio::test]
    async fn deposit_round_trip_through_admin() {
        let (mut client, _) = setup(Latency::none());
        client.login("alex@test.com", "password123").await.unwrap();
        client.deposit(deposit_of(100.0)).await.unwrap();
        let user = client.state().user.unwrap();
        let tx_id = user.transactions[0].id.clone();

        let mut admin =
            Client::new(client.api.clone(), client.storage.clone(), LedgerConfig::default());
        admin.login("admin@cryptopulse.com", "admin").await.unwrap();
        let pending = admin.fetch_pending_deposits().await.unwrap();
        assert_eq!(pending.len(), 1);
        admin
            .update_deposit_status(&user.uid, &tx_id, DepositDecision::Completed)
            .await
            .unwrap();

        // the user's cached copy is stale until the next ledger round-trip
        client.mark_all_notifications_read().await.unwrap();
        let user = client.state().user.unwrap();
        assert_eq!(user.portfolio.balance, Amount::from_float(50_100.0));
        assert_eq!(user.portfolio.pending_balance, Amount::ZERO);
    }
}
