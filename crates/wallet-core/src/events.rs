//! Wallet callbacks and the queue that delivers them.
//!
//! Mutations never call handlers directly. They push [`WalletEvent`]s while
//! holding the wallet's writer lock, and the events are handed out after the
//! lock is released, one at a time, by whichever thread is not already
//! draining. A handler may therefore call back into the wallet: its own
//! events are appended and delivered after the current one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chain_btc::{Address, Transaction};
use crypto_utils::UInt256;

use crate::types::TxStatus;

pub type BalanceChangedFn = Arc<dyn Fn(u64) + Send + Sync>;
pub type TxAddedFn = Arc<dyn Fn(&Transaction) + Send + Sync>;
pub type TxUpdatedFn = Arc<dyn Fn(&UInt256, TxStatus) + Send + Sync>;
pub type TxDeletedFn = Arc<dyn Fn(&UInt256) + Send + Sync>;
pub type TxStatusUpdateFn = Arc<dyn Fn(&Address, &UInt256, TxStatus) + Send + Sync>;
pub type SyncStartedFn = Arc<dyn Fn() + Send + Sync>;
pub type SyncSucceededFn = Arc<dyn Fn(u32) + Send + Sync>;
pub type SyncFailedFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Something the wallet reports to its host, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    BalanceChanged(u64),
    TxAdded(Transaction),
    TxUpdated { hash: UInt256, status: TxStatus },
    TxDeleted { hash: UInt256 },
    /// An owned address appears in a transaction whose status changed.
    TxStatusUpdate {
        address: Address,
        hash: UInt256,
        status: TxStatus,
    },
    SyncStarted,
    SyncSucceeded { height: u32 },
    SyncFailed { error: String },
}

/// Input from the network collaborator, routed by [`crate::Wallet::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TransactionSeen(Transaction),
    TransactionsConfirmed {
        hashes: Vec<UInt256>,
        /// `None` moves the transactions back to pending (reorg).
        height: Option<u32>,
        timestamp: u32,
    },
    TransactionDropped(UInt256),
    BlockHeight(u32),
    SyncStarted,
    SyncSucceeded { height: u32 },
    SyncFailed { error: String },
}

/// One optional handler per event; assignment replaces.
#[derive(Default, Clone)]
pub(crate) struct Callbacks {
    pub balance_changed: Option<BalanceChangedFn>,
    pub tx_added: Option<TxAddedFn>,
    pub tx_updated: Option<TxUpdatedFn>,
    pub tx_deleted: Option<TxDeletedFn>,
    pub tx_status_update: Option<TxStatusUpdateFn>,
    pub sync_started: Option<SyncStartedFn>,
    pub sync_succeeded: Option<SyncSucceededFn>,
    pub sync_failed: Option<SyncFailedFn>,
}

#[derive(Default)]
struct Queue {
    events: VecDeque<WalletEvent>,
    draining: bool,
}

#[derive(Default)]
pub(crate) struct Notifier {
    callbacks: RwLock<Callbacks>,
    queue: Mutex<Queue>,
}

impl Notifier {
    pub fn callbacks(&self) -> std::sync::RwLockReadGuard<'_, Callbacks> {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_callbacks(&self, f: impl FnOnce(&mut Callbacks)) {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut callbacks);
    }

    /// Queues events. Callers hold the wallet's writer lock so that the
    /// queue order matches commit order.
    pub fn enqueue(&self, events: impl IntoIterator<Item = WalletEvent>) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.events.extend(events);
    }

    /// Delivers queued events until the queue is empty. Returns at once if
    /// another frame or thread is already draining.
    pub fn deliver(&self) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.draining || queue.events.is_empty() {
                return;
            }
            queue.draining = true;
        }
        let _guard = DrainGuard(&self.queue);

        loop {
            let event = {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                match queue.events.pop_front() {
                    Some(event) => event,
                    None => {
                        // Cleared under the same lock that saw the queue empty, so an
                        // enqueue racing with this return finds the flag down and drains.
                        queue.draining = false;
                        return;
                    }
                }
            };
            let callbacks = self.callbacks().clone();
            dispatch(&callbacks, &event);
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).events.len()
    }
}

/// Clears the draining flag when a handler panics. Normal exits clear it
/// in [`Notifier::deliver`] itself.
struct DrainGuard<'a>(&'a Mutex<Queue>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).draining = false;
        }
    }
}

fn dispatch(callbacks: &Callbacks, event: &WalletEvent) {
    match event {
        WalletEvent::BalanceChanged(balance) => {
            if let Some(f) = &callbacks.balance_changed {
                f(*balance);
            }
        }
        WalletEvent::TxAdded(tx) => {
            if let Some(f) = &callbacks.tx_added {
                f(tx);
            }
        }
        WalletEvent::TxUpdated { hash, status } => {
            if let Some(f) = &callbacks.tx_updated {
                f(hash, *status);
            }
        }
        WalletEvent::TxDeleted { hash } => {
            if let Some(f) = &callbacks.tx_deleted {
                f(hash);
            }
        }
        WalletEvent::TxStatusUpdate { address, hash, status } => {
            if let Some(f) = &callbacks.tx_status_update {
                f(address, hash, *status);
            }
        }
        WalletEvent::SyncStarted => {
            if let Some(f) = &callbacks.sync_started {
                f();
            }
        }
        WalletEvent::SyncSucceeded { height } => {
            if let Some(f) = &callbacks.sync_succeeded {
                f(*height);
            }
        }
        WalletEvent::SyncFailed { error } => {
            if let Some(f) = &callbacks.sync_failed {
                f(error);
            }
        }
    }
}
