pub mod amount;
pub mod api;
pub mod client;
pub mod config;
pub mod csv;
pub mod ledger;
pub mod model;
pub mod replay;
pub mod session;
pub mod store;

pub use amount::Amount;
pub use api::Api;
pub use client::{Client, ClientState};
pub use config::{Latency, LedgerConfig};
pub use ledger::{Ledger, LedgerError};
pub use model::{Transaction, TxId, Uid, User};
pub use session::Token;
pub use store::PersistentStore;
