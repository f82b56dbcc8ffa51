use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use fedpeg_primitives::MaturedBlockDeposits;
use fedpeg_transfer_store::CrossChainTransferStore;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::throttle::RequestThrottle;

/// How often we may re-request the same matured height from peers.
const REQUEST_INTERVAL: Duration = Duration::from_secs(30);

/// Early batches buffered while waiting for the one the cursor expects.
const MAX_BUFFERED_BATCHES: usize = 256;

/// Asks the gossip layer for matured block deposits from a height onward.
#[async_trait]
pub trait MatureBlockRequester: Send + Sync + 'static {
    async fn request_mature_blocks(&self, from_height: u32) -> anyhow::Result<()>;
}

/// Drains matured-block deposit batches into the store in height order.
pub struct DepositPersister<R> {
    store: Arc<CrossChainTransferStore>,
    requester: R,
    receiver: mpsc::Receiver<MaturedBlockDeposits>,
    shutdown: watch::Receiver<bool>,
    throttle: RequestThrottle,
    buffer: BTreeMap<u32, MaturedBlockDeposits>,
}

impl<R: MatureBlockRequester> DepositPersister<R> {
    pub fn new(
        store: Arc<CrossChainTransferStore>,
        requester: R,
        receiver: mpsc::Receiver<MaturedBlockDeposits>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            requester,
            receiver,
            shutdown,
            throttle: RequestThrottle::new(REQUEST_INTERVAL),
            buffer: BTreeMap::new(),
        }
    }

    /// Runs until the channel closes or shutdown is signalled. A store
    /// error ends the task; the store instance must be restarted.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            let batch = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    debug!("deposit persister shutting down");
                    return Ok(());
                }
                batch = self.receiver.recv() => match batch {
                    Some(batch) => batch,
                    None => {
                        debug!("matured block channel closed");
                        return Ok(());
                    }
                },
            };

            if let Err(e) = self.handle_batch(batch).await {
                error!(%e, "deposit persister failed");
                return Err(e);
            }
        }
    }

    async fn handle_batch(&mut self, batch: MaturedBlockDeposits) -> anyhow::Result<()> {
        let expected = self.store.next_mature_deposit_height().await;
        if batch.block_height < expected {
            debug!(
                height = batch.block_height,
                expected, "dropping stale matured block batch"
            );
        } else {
            self.buffer.insert(batch.block_height, batch);
            // Keep the buffer bounded; the farthest-ahead batches are the
            // cheapest to re-request.
            while self.buffer.len() > MAX_BUFFERED_BATCHES {
                if let Some((height, _)) = self.buffer.pop_last() {
                    warn!(height, "matured block buffer full, dropping batch");
                }
            }
        }

        self.drain_in_order().await?;

        // Ask for more unconditionally; the throttle keeps us from
        // hammering peers about the same height.
        let next = self.store.next_mature_deposit_height().await;
        self.throttle.forget_below(next);
        if self.throttle.allow(next, Instant::now()) {
            self.requester.request_mature_blocks(next).await?;
        }
        Ok(())
    }

    async fn drain_in_order(&mut self) -> anyhow::Result<()> {
        loop {
            let expected = self.store.next_mature_deposit_height().await;
            self.buffer = self.buffer.split_off(&expected);
            let Some(batch) = self.buffer.remove(&expected) else {
                return Ok(());
            };

            self.store
                .record_latest_mature_deposits(&batch.deposits)
                .await?;

            if self.store.next_mature_deposit_height().await == expected {
                // Something suspended and the cursor stayed put; the
                // height will be retried on a later delivery.
                debug!(height = expected, "batch left deposits suspended");
                return Ok(());
            }
        }
    }
}
