//! Ready-made store wiring over a temporary database and mocks.

use std::sync::Arc;

use fedpeg_db_store_sled::{SledDbConfig, TransferDBSled};
use fedpeg_transfer_store::{CrossChainTransferStore, StoreConfig};
use tokio::sync::watch;

use crate::{chain::MockChain, wallet::MockFederationWallet};

pub struct StoreHarness {
    pub store: Arc<CrossChainTransferStore>,
    pub wallet: Arc<MockFederationWallet>,
    pub chain: MockChain,
    pub db: Arc<TransferDBSled>,
    pub config: StoreConfig,
    pub shutdown: watch::Sender<bool>,
}

impl StoreHarness {
    /// A store over a fresh temporary database, with one empty block on
    /// the chain and the wallet chasing it. `initialize` is left to the
    /// test.
    pub fn new(config: StoreConfig) -> Self {
        let sled_db = sled::Config::new().temporary(true).open().unwrap();
        let db = Arc::new(TransferDBSled::new(sled_db, SledDbConfig::test()).unwrap());
        let wallet = Arc::new(MockFederationWallet::new(1, 2));
        let chain = MockChain::new();
        let tip = chain.push_block(vec![]);
        wallet.set_tip(tip);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let store = Arc::new(CrossChainTransferStore::new(
            db.clone(),
            wallet.clone(),
            Arc::new(chain.clone()),
            Arc::new(chain.clone()),
            config.clone(),
            shutdown_rx,
        ));
        Self {
            store,
            wallet,
            chain,
            db,
            config,
            shutdown,
        }
    }

    /// A second store instance over the same database and collaborators,
    /// as after a process restart.
    pub fn restarted_store(&self) -> Arc<CrossChainTransferStore> {
        Arc::new(CrossChainTransferStore::new(
            self.db.clone(),
            self.wallet.clone(),
            Arc::new(self.chain.clone()),
            Arc::new(self.chain.clone()),
            self.config.clone(),
            self.shutdown.subscribe(),
        ))
    }
}
