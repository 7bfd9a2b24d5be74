use std::env;
use std::sync::Arc;

use pulse_ledger::csv::{read_commands, write_accounts};
use pulse_ledger::replay::Replayer;
use pulse_ledger::store::FileStorage;
use pulse_ledger::{Api, Ledger, LedgerConfig, PersistentStore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: pulse-ledger <script.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = LedgerConfig::from_env();
    let storage = FileStorage::open(&config.data_dir).expect("failed to open data directory");
    let store = PersistentStore::new(Arc::new(storage), config.db_key.clone());
    let api = Api::new(Ledger::open(store, &config), config.latency);

    let commands = read_commands(path).expect("failed to open csv file");
    let (command_sender, command_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    command_sender.send(command).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let mut replayer = Replayer::new(api);
    replayer.run(ReceiverStream::new(command_receiver)).await;

    let api = replayer.into_api();
    let users: Vec<_> = api.with_ledger(|ledger| ledger.users().cloned().collect()).await;
    if let Err(e) = write_accounts(&users) {
        error!("failed to write accounts: {e}");
    }

    if let Some(ledger) = api.into_ledger() {
        ledger.close();
    }
}
