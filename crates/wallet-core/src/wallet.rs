//! The wallet ledger.
//!
//! A [`Wallet`] tracks every transaction that touches its addresses, keyed by
//! hash, together with a [`TxStatus`]. The balance is always the sum of owned
//! outputs that no active transaction spends; it is recomputed from the
//! transaction set after every mutation rather than adjusted incrementally.
//!
//! All mutations go through one writer lock and validate before changing
//! anything, so a rejected call leaves the wallet exactly as it was.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chain_btc::script::{self, ScriptTemplate};
use chain_btc::transaction::{
    fee_for_size, TXIN_SEQUENCE, TX_MAX_LOCK_HEIGHT, TX_MIN_OUTPUT_AMOUNT,
};
use chain_btc::{select_utxos, Address, BtcError, Key, OutPoint, Transaction, TxInput, Utxo};
use crypto_utils::UInt256;
use tracing::{debug, info, warn};

use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::events::{
    BalanceChangedFn, Notifier, SyncEvent, SyncFailedFn, SyncStartedFn, SyncSucceededFn,
    TxAddedFn, TxDeletedFn, TxStatusUpdateFn, TxUpdatedFn, WalletEvent,
};
use crate::hd_derivation::MasterPubKey;
use crate::types::{SequenceChain, TxStatus};

type KeyPath = (SequenceChain, u32);

/// How far ahead a timestamp lock time may be and still count as minable.
const LOCK_TIME_GRACE_SECS: u64 = 10 * 60;

struct TrackedTx {
    tx: Transaction,
    status: TxStatus,
    /// Order in which the wallet last accepted this transaction.
    seen: u64,
}

struct WalletState {
    txs: HashMap<UInt256, TrackedTx>,
    /// Derived addresses per chain, indexed by child number.
    addresses: [Vec<Address>; 2],
    /// Lock script of every derived address.
    owned: HashMap<Vec<u8>, KeyPath>,
    balance: u64,
    block_height: u32,
    syncing: bool,
    next_seen: u64,
}

/// SPV wallet over one [`MasterPubKey`].
pub struct Wallet {
    mpk: MasterPubKey,
    config: WalletConfig,
    state: RwLock<WalletState>,
    notifier: Notifier,
}

macro_rules! callback_slot {
    ($(#[$doc:meta])* $set:ident, $get:ident, $field:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $set(&self, handler: Option<$ty>) {
            self.notifier.update_callbacks(|c| c.$field = handler);
        }

        pub fn $get(&self) -> Option<$ty> {
            self.notifier.callbacks().$field.clone()
        }
    };
}

impl Wallet {
    pub fn new(mpk: MasterPubKey, config: WalletConfig) -> Result<Self, WalletError> {
        config.validate()?;
        if mpk.is_empty() {
            return Err(WalletError::EmptyMasterKey);
        }

        let mut state = WalletState {
            txs: HashMap::new(),
            addresses: [Vec::new(), Vec::new()],
            owned: HashMap::new(),
            balance: 0,
            block_height: 0,
            syncing: false,
            next_seen: 0,
        };
        state.ensure_gap(&mpk, &config)?;

        info!(
            network = %config.network,
            fingerprint = %hex::encode(mpk.fingerprint()),
            "wallet opened"
        );
        Ok(Self {
            mpk,
            config,
            state: RwLock::new(state),
            notifier: Notifier::default(),
        })
    }

    /// Rebuilds a wallet from persisted transactions.
    ///
    /// Confirmed transactions are replayed by height, then pending ones by
    /// timestamp. Transactions the wallet no longer accepts are skipped.
    pub fn with_transactions(
        mpk: MasterPubKey,
        config: WalletConfig,
        txs: impl IntoIterator<Item = Transaction>,
    ) -> Result<Self, WalletError> {
        let wallet = Self::new(mpk, config)?;
        let mut txs: Vec<Transaction> = txs.into_iter().collect();
        txs.sort_by_key(|tx| (tx.block_height.unwrap_or(u32::MAX), tx.timestamp));

        for tx in txs {
            let txid = tx.txid();
            if let Err(e) = wallet.add_transaction(tx) {
                warn!(%txid, error = %e, "skipping persisted transaction");
            }
        }
        Ok(wallet)
    }

    pub fn master_pub_key(&self) -> &MasterPubKey {
        &self.mpk
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, WalletState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WalletState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one mutation under the writer lock, then delivers its events.
    ///
    /// `f` must not touch the state when it returns an error.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut WalletState, &mut Vec<WalletEvent>) -> Result<T, WalletError>,
    ) -> Result<T, WalletError> {
        let result = {
            let mut state = self.write();
            let mut events = Vec::new();
            let result = f(&mut state, &mut events);
            if result.is_ok() {
                state.refresh(&self.mpk, &self.config, &mut events);
            }
            self.notifier.enqueue(events);
            result
        };
        self.notifier.deliver();
        result
    }

    // ─── Ingestion ──────────────────────────────────────────────────

    /// Accepts a signed transaction that pays to or spends from the wallet.
    ///
    /// A transaction spending an outpoint already spent by a tracked one
    /// replaces it when it wins the conflict (confirmed over unconfirmed,
    /// higher height, then most recently seen); the loser and everything
    /// built on it become [`TxStatus::Removed`]. A known hash only has its
    /// confirmation height refreshed.
    pub fn add_transaction(&self, tx: Transaction) -> Result<(), WalletError> {
        let hash = tx.hash();
        self.mutate(|state, events| state.add(hash, tx, events))
    }

    /// Moves a transaction to confirmed at `height`, or back to pending when
    /// `height` is `None`. Giving a removed transaction a height revives it.
    pub fn update_transaction(
        &self,
        hash: &UInt256,
        height: Option<u32>,
        timestamp: u32,
    ) -> Result<(), WalletError> {
        self.mutate(|state, events| state.update(*hash, height, timestamp, events))
    }

    /// Batch form of [`Wallet::update_transaction`]. Every hash must be known;
    /// a removed transaction that cannot be revived is left removed. Parents
    /// are updated before their children whatever the order of `hashes`.
    pub fn update_transactions(
        &self,
        hashes: &[UInt256],
        height: Option<u32>,
        timestamp: u32,
    ) -> Result<(), WalletError> {
        self.mutate(|state, events| {
            for hash in hashes {
                state.ensure_known(hash)?;
            }
            for hash in state.parents_first(hashes) {
                if let Err(e) = state.update(hash, height, timestamp, events) {
                    warn!(txid = %txid(&hash), error = %e, "transaction left removed");
                }
            }
            Ok(())
        })
    }

    /// Forgets a transaction and, transitively, every tracked transaction
    /// spending its outputs.
    pub fn delete_transaction(&self, hash: &UInt256) -> Result<(), WalletError> {
        self.mutate(|state, events| {
            state.ensure_known(hash)?;
            for doomed in state.descendants(&[*hash], false) {
                state.txs.remove(&doomed);
                debug!(txid = %txid(&doomed), "transaction deleted");
                events.push(WalletEvent::TxDeleted { hash: doomed });
            }
            Ok(())
        })
    }

    /// Records the chain tip.
    pub fn set_block_height(&self, height: u32) {
        self.write().block_height = height;
        debug!(height, "block height updated");
    }

    // ─── Sync lifecycle ─────────────────────────────────────────────

    pub fn sync_started(&self) -> Result<(), WalletError> {
        self.mutate(|state, events| {
            if state.syncing {
                return Err(WalletError::SyncInProgress);
            }
            state.syncing = true;
            info!(height = state.block_height, "sync started");
            events.push(WalletEvent::SyncStarted);
            Ok(())
        })
    }

    pub fn sync_succeeded(&self, height: u32) -> Result<(), WalletError> {
        self.mutate(|state, events| {
            if !state.syncing {
                return Err(WalletError::NoSyncInProgress);
            }
            state.syncing = false;
            state.block_height = height;
            info!(height, "sync succeeded");
            events.push(WalletEvent::SyncSucceeded { height });
            Ok(())
        })
    }

    pub fn sync_failed(&self, error: impl Into<String>) -> Result<(), WalletError> {
        let error = error.into();
        self.mutate(|state, events| {
            if !state.syncing {
                return Err(WalletError::NoSyncInProgress);
            }
            state.syncing = false;
            warn!(%error, "sync failed");
            events.push(WalletEvent::SyncFailed { error });
            Ok(())
        })
    }

    pub fn is_syncing(&self) -> bool {
        self.read().syncing
    }

    /// Routes an event from the network collaborator.
    pub fn apply(&self, event: SyncEvent) -> Result<(), WalletError> {
        match event {
            SyncEvent::TransactionSeen(tx) => self.add_transaction(tx),
            SyncEvent::TransactionsConfirmed {
                hashes,
                height,
                timestamp,
            } => self.update_transactions(&hashes, height, timestamp),
            SyncEvent::TransactionDropped(hash) => self.delete_transaction(&hash),
            SyncEvent::BlockHeight(height) => {
                self.set_block_height(height);
                Ok(())
            }
            SyncEvent::SyncStarted => self.sync_started(),
            SyncEvent::SyncSucceeded { height } => self.sync_succeeded(height),
            SyncEvent::SyncFailed { error } => self.sync_failed(error),
        }
    }

    // ─── Callbacks ──────────────────────────────────────────────────

    callback_slot!(
        /// Called with the new balance whenever a mutation changes it.
        set_on_balance_changed, on_balance_changed, balance_changed, BalanceChangedFn
    );
    callback_slot!(set_on_tx_added, on_tx_added, tx_added, TxAddedFn);
    callback_slot!(set_on_tx_updated, on_tx_updated, tx_updated, TxUpdatedFn);
    callback_slot!(set_on_tx_deleted, on_tx_deleted, tx_deleted, TxDeletedFn);
    callback_slot!(
        /// Called once per owned address of a transaction whose status changed.
        set_on_tx_status_update, on_tx_status_update, tx_status_update, TxStatusUpdateFn
    );
    callback_slot!(set_on_sync_started, on_sync_started, sync_started, SyncStartedFn);
    callback_slot!(set_on_sync_succeeded, on_sync_succeeded, sync_succeeded, SyncSucceededFn);
    callback_slot!(set_on_sync_failed, on_sync_failed, sync_failed, SyncFailedFn);

    // ─── Queries ────────────────────────────────────────────────────

    pub fn balance(&self) -> u64 {
        self.read().balance
    }

    /// Balance computed from scratch over the transaction set.
    pub fn recompute_balance(&self) -> u64 {
        self.read().compute_balance()
    }

    /// Lowest-index external address no active transaction has used.
    pub fn receive_address(&self) -> Address {
        self.read().unused_address(SequenceChain::External)
    }

    /// Lowest-index internal address no active transaction has used.
    pub fn change_address(&self) -> Address {
        self.read().unused_address(SequenceChain::Internal)
    }

    /// Every derived address, external chain first.
    pub fn all_addresses(&self) -> Vec<Address> {
        let state = self.read();
        state.addresses.iter().flatten().cloned().collect()
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        address.network() == self.config.network
            && self.read().owned.contains_key(&address.script_pubkey())
    }

    pub fn address_is_used(&self, address: &Address) -> bool {
        let state = self.read();
        match state.owned.get(&address.script_pubkey()) {
            Some(path) if address.network() == self.config.network => {
                state.used_paths().contains(path)
            }
            _ => false,
        }
    }

    /// Active transactions, confirmed ones by height then pending ones in
    /// the order they were seen.
    pub fn transactions(&self) -> Vec<Transaction> {
        let state = self.read();
        let ordered = state.ordered();
        ordered.into_iter().map(|(_, t)| t.tx.clone()).collect()
    }

    /// Any tracked transaction, removed ones included.
    pub fn transaction(&self, hash: &UInt256) -> Option<Transaction> {
        self.read().txs.get(hash).map(|t| t.tx.clone())
    }

    pub fn contains_transaction(&self, hash: &UInt256) -> bool {
        self.read().txs.contains_key(hash)
    }

    pub fn status(&self, hash: &UInt256) -> Option<TxStatus> {
        self.read().txs.get(hash).map(|t| t.status)
    }

    /// Blocks on top of and including the confirming one; 0 while pending.
    pub fn confirmations(&self, hash: &UInt256) -> Option<u32> {
        let state = self.read();
        match state.txs.get(hash)?.status {
            TxStatus::Confirmed { height } => Some(state.block_height.saturating_sub(height) + 1),
            TxStatus::Pending => Some(0),
            TxStatus::Removed => None,
        }
    }

    /// Whether `tx` is signed, double-spends no active transaction and builds
    /// on no removed one. A tracked transaction is valid until it is removed.
    pub fn transaction_is_valid(&self, tx: &Transaction) -> bool {
        self.read().is_valid(&tx.hash(), tx)
    }

    /// Whether `tx`, or a tracked transaction it spends from, cannot be mined
    /// in the block after `block_height` or within the next ten minutes.
    /// Confirmed transactions never are.
    pub fn transaction_is_postdated(&self, tx: &Transaction, block_height: u32) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.read().is_postdated(tx, block_height, now)
    }

    /// Wallet balance right after `hash` in [`Wallet::transactions`] order, or
    /// the current balance when `hash` is not an active transaction.
    pub fn balance_after_tx(&self, hash: &UInt256) -> u64 {
        let state = self.read();
        let mut balance = 0u64;
        for (tracked_hash, tracked) in state.ordered() {
            balance = balance
                .saturating_add(state.amount_received(&tracked.tx))
                .saturating_sub(state.amount_sent(&tracked.tx));
            if tracked_hash == hash {
                return balance;
            }
        }
        state.balance
    }

    pub fn last_block_height(&self) -> u32 {
        self.read().block_height
    }

    pub fn utxos(&self) -> Vec<Utxo> {
        self.read().utxos()
    }

    /// Value `tx` pays to wallet addresses.
    pub fn amount_received_from_tx(&self, tx: &Transaction) -> u64 {
        self.read().amount_received(tx)
    }

    /// Value of wallet outputs `tx` spends.
    pub fn amount_sent_by_tx(&self, tx: &Transaction) -> u64 {
        self.read().amount_sent(tx)
    }

    /// Input total minus output total, when every input's value is known.
    pub fn fee_for_tx(&self, tx: &Transaction) -> Option<u64> {
        let state = self.read();
        let input_total = tx.inputs().iter().try_fold(0u64, |acc, input| {
            let amount = input.amount.or_else(|| state.prev_output(input).map(|o| o.0))?;
            acc.checked_add(amount)
        })?;
        input_total.checked_sub(tx.output_total())
    }

    pub fn total_received(&self) -> u64 {
        let state = self.read();
        state.active().map(|(_, t)| state.amount_received(&t.tx)).sum()
    }

    pub fn total_sent(&self) -> u64 {
        let state = self.read();
        state.active().map(|(_, t)| state.amount_sent(&t.tx)).sum()
    }

    /// Fee the wallet pays for a transaction of `size` bytes.
    pub fn fee_for_tx_size(&self, size: usize) -> u64 {
        fee_for_size(size, self.config.fee_per_kb)
    }

    // ─── Sending ────────────────────────────────────────────────────

    /// Unsigned transaction paying `amount` to `to`, funded largest-first from
    /// the wallet's outputs, with change to [`Wallet::change_address`] unless
    /// the change would be dust.
    ///
    /// The wallet does not track the result until it is signed and passed to
    /// [`Wallet::add_transaction`].
    pub fn create_transaction(&self, amount: u64, to: &Address) -> Result<Transaction, WalletError> {
        if to.network() != self.config.network {
            return Err(BtcError::InvalidNetwork(format!(
                "{to} is not a {} address",
                self.config.network
            ))
            .into());
        }
        if amount < TX_MIN_OUTPUT_AMOUNT {
            return Err(BtcError::InvalidAmount(format!(
                "{amount} sat is below the {TX_MIN_OUTPUT_AMOUNT} sat dust limit"
            ))
            .into());
        }

        let state = self.read();
        let selection = select_utxos(&state.utxos(), amount, self.config.fee_per_kb)?;

        let mut tx = Transaction::new();
        for utxo in &selection.selected {
            tx.add_input(
                utxo.outpoint.hash,
                utxo.outpoint.index,
                utxo.script_pubkey.clone(),
                utxo.amount,
            )?;
        }
        tx.add_output_to(amount, to)?;

        let change = selection.change(amount);
        if change >= TX_MIN_OUTPUT_AMOUNT {
            tx.add_output_to(change, &state.unused_address(SequenceChain::Internal))?;
        }

        debug!(
            amount,
            fee = selection.fee,
            change,
            inputs = selection.selected.len(),
            "transaction created"
        );
        Ok(tx)
    }

    /// Signs every input of `tx` that spends a wallet address, deriving the
    /// keys from `seed`.
    pub fn sign_transaction(&self, tx: &mut Transaction, seed: &[u8]) -> Result<(), WalletError> {
        let paths: Vec<KeyPath> = {
            let state = self.read();
            let mut paths = Vec::new();
            for input in tx.inputs().iter().filter(|i| !i.is_signed()) {
                let owned = input
                    .script_pubkey
                    .as_ref()
                    .and_then(|s| state.owned.get(s));
                if let Some(path) = owned {
                    if !paths.contains(path) {
                        paths.push(*path);
                    }
                }
            }
            paths
        };

        let keys: Vec<Key> = self
            .mpk
            .priv_keys(seed, &paths)?
            .into_iter()
            .map(|key| key.with_network(self.config.network))
            .collect();
        tx.sign(&keys)?;
        Ok(())
    }
}

impl WalletState {
    fn ensure_known(&self, hash: &UInt256) -> Result<(), WalletError> {
        if self.txs.contains_key(hash) {
            Ok(())
        } else {
            Err(WalletError::UnknownTransaction(txid(hash)))
        }
    }

    fn active(&self) -> impl Iterator<Item = (&UInt256, &TrackedTx)> {
        self.txs.iter().filter(|(_, t)| !t.status.is_removed())
    }

    /// Active transactions, confirmed by height then pending by arrival.
    fn ordered(&self) -> Vec<(&UInt256, &TrackedTx)> {
        let mut active: Vec<(&UInt256, &TrackedTx)> = self.active().collect();
        active.sort_by_key(|(_, t)| (t.status.height().unwrap_or(u32::MAX), t.seen));
        active
    }

    fn is_owned(&self, script: &[u8]) -> bool {
        self.owned.contains_key(script)
    }

    /// Amount and lock script of the tracked output an input spends.
    fn prev_output(&self, input: &TxInput) -> Option<(u64, &[u8])> {
        let prev = self.txs.get(&input.prev_hash)?;
        let output = prev.tx.outputs().get(input.prev_index as usize)?;
        Some((output.amount, &output.script_pubkey))
    }

    fn spent_outpoints(&self) -> HashSet<OutPoint> {
        self.active()
            .flat_map(|(_, t)| t.tx.inputs().iter().map(TxInput::outpoint))
            .collect()
    }

    fn utxos(&self) -> Vec<Utxo> {
        let spent = self.spent_outpoints();
        let mut utxos: Vec<Utxo> = self
            .active()
            .flat_map(|(hash, t)| {
                t.tx.outputs().iter().enumerate().map(move |(index, output)| Utxo {
                    outpoint: OutPoint {
                        hash: *hash,
                        index: index as u32,
                    },
                    amount: output.amount,
                    script_pubkey: output.script_pubkey.clone(),
                })
            })
            .filter(|utxo| self.is_owned(&utxo.script_pubkey) && !spent.contains(&utxo.outpoint))
            .collect();
        utxos.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        utxos
    }

    fn compute_balance(&self) -> u64 {
        self.utxos()
            .iter()
            .fold(0u64, |acc, utxo| acc.saturating_add(utxo.amount))
    }

    fn amount_received(&self, tx: &Transaction) -> u64 {
        tx.outputs()
            .iter()
            .filter(|o| self.is_owned(&o.script_pubkey))
            .fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    fn amount_sent(&self, tx: &Transaction) -> u64 {
        tx.inputs()
            .iter()
            .filter_map(|input| self.prev_output(input))
            .filter(|(_, script)| self.is_owned(script))
            .fold(0u64, |acc, (amount, _)| acc.saturating_add(amount))
    }

    /// Key paths of owned addresses an active transaction pays to or spends from.
    fn used_paths(&self) -> HashSet<KeyPath> {
        self.active()
            .flat_map(|(_, t)| self.owned_paths(&t.tx))
            .collect()
    }

    fn owned_paths(&self, tx: &Transaction) -> Vec<KeyPath> {
        let outputs = tx.outputs().iter().map(|o| o.script_pubkey.clone());
        let inputs = tx.inputs().iter().filter_map(claimed_script);
        let mut paths = Vec::new();
        for script in outputs.chain(inputs) {
            if let Some(path) = self.owned.get(&script) {
                if !paths.contains(path) {
                    paths.push(*path);
                }
            }
        }
        paths
    }

    fn owned_addresses(&self, tx: &Transaction) -> Vec<Address> {
        self.owned_paths(tx)
            .into_iter()
            .filter_map(|(chain, index)| self.addresses[slot(chain)].get(index as usize).cloned())
            .collect()
    }

    fn unused_address(&self, chain: SequenceChain) -> Address {
        let used = self.used_paths();
        let addresses = &self.addresses[slot(chain)];
        let index = (0..addresses.len())
            .find(|&i| !used.contains(&(chain, i as u32)))
            .unwrap_or(addresses.len() - 1);
        addresses[index].clone()
    }

    /// Derives addresses until each chain has its gap limit of unused
    /// addresses past the highest used one.
    fn ensure_gap(&mut self, mpk: &MasterPubKey, config: &WalletConfig) -> Result<(), WalletError> {
        let used = self.used_paths();
        for chain in SequenceChain::ALL {
            let gap = match chain {
                SequenceChain::External => config.gap_limit_external,
                SequenceChain::Internal => config.gap_limit_internal,
            };
            let first_unused = used
                .iter()
                .filter(|(c, _)| *c == chain)
                .map(|&(_, index)| index as usize + 1)
                .max()
                .unwrap_or(0);

            let addresses = &mut self.addresses[slot(chain)];
            while addresses.len() < first_unused + gap as usize {
                let index = addresses.len() as u32;
                let address = mpk.address(chain, index, config.network)?;
                self.owned.insert(address.script_pubkey(), (chain, index));
                addresses.push(address);
            }
        }
        Ok(())
    }

    /// Post-mutation bookkeeping: gap extension and the balance event.
    fn refresh(&mut self, mpk: &MasterPubKey, config: &WalletConfig, events: &mut Vec<WalletEvent>) {
        if let Err(e) = self.ensure_gap(mpk, config) {
            warn!(error = %e, "could not extend address gap");
        }
        let balance = self.compute_balance();
        if balance != self.balance {
            debug!(old = self.balance, new = balance, "balance changed");
            self.balance = balance;
            events.push(WalletEvent::BalanceChanged(balance));
        }
    }

    /// `roots` plus every tracked transaction built on top of them, parents
    /// before children.
    fn descendants(&self, roots: &[UInt256], active_only: bool) -> Vec<UInt256> {
        let mut found: Vec<UInt256> = roots.to_vec();
        let mut seen: HashSet<UInt256> = roots.iter().copied().collect();
        let mut next = 0;
        while next < found.len() {
            let parent = found[next];
            next += 1;
            let mut children: Vec<&UInt256> = self
                .txs
                .iter()
                .filter(|(hash, t)| {
                    !seen.contains(*hash)
                        && !(active_only && t.status.is_removed())
                        && t.tx.inputs().iter().any(|i| i.prev_hash == parent)
                })
                .map(|(hash, _)| hash)
                .collect();
            children.sort();
            for child in children {
                seen.insert(*child);
                found.push(*child);
            }
        }
        found
    }

    /// `hashes` reordered so each one follows any of its parents in the list.
    fn parents_first(&self, hashes: &[UInt256]) -> Vec<UInt256> {
        let batch: HashSet<UInt256> = hashes.iter().copied().collect();
        let mut placed = HashSet::new();
        let mut ordered = Vec::with_capacity(batch.len());
        for hash in hashes {
            self.place_after_parents(*hash, &batch, &mut placed, &mut ordered);
        }
        ordered
    }

    fn place_after_parents(
        &self,
        hash: UInt256,
        batch: &HashSet<UInt256>,
        placed: &mut HashSet<UInt256>,
        ordered: &mut Vec<UInt256>,
    ) {
        if !placed.insert(hash) {
            return;
        }
        if let Some(tracked) = self.txs.get(&hash) {
            for input in tracked.tx.inputs() {
                if batch.contains(&input.prev_hash) {
                    self.place_after_parents(input.prev_hash, batch, placed, ordered);
                }
            }
        }
        ordered.push(hash);
    }

    fn is_valid(&self, hash: &UInt256, tx: &Transaction) -> bool {
        if !tx.is_signed() {
            return false;
        }
        if let Some(tracked) = self.txs.get(hash) {
            return !tracked.status.is_removed();
        }
        let spent = self.spent_outpoints();
        tx.inputs().iter().all(|input| {
            !spent.contains(&input.outpoint())
                && !self
                    .txs
                    .get(&input.prev_hash)
                    .is_some_and(|parent| parent.status.is_removed())
        })
    }

    fn is_postdated(&self, tx: &Transaction, block_height: u32, now: u64) -> bool {
        if self.txs.get(&tx.hash()).is_some_and(|t| t.status.is_confirmed()) {
            return false;
        }
        let lock_time = tx.lock_time();
        let locked = if lock_time < TX_MAX_LOCK_HEIGHT {
            lock_time > block_height.saturating_add(1)
        } else {
            u64::from(lock_time) > now + LOCK_TIME_GRACE_SECS
        };
        if locked && tx.inputs().iter().any(|i| i.sequence < TXIN_SEQUENCE) {
            return true;
        }
        tx.inputs().iter().any(|input| {
            self.txs
                .get(&input.prev_hash)
                .is_some_and(|parent| self.is_postdated(&parent.tx, block_height, now))
        })
    }

    /// Active transactions `tx` would displace if it became active with
    /// `status`, or the reason it cannot.
    fn resolve_conflicts(
        &self,
        hash: &UInt256,
        tx: &Transaction,
        status: TxStatus,
        seen: u64,
    ) -> Result<Vec<UInt256>, WalletError> {
        let outpoints: HashSet<OutPoint> = tx.inputs().iter().map(TxInput::outpoint).collect();
        let mut rivals: Vec<UInt256> = Vec::new();
        for (other_hash, other) in self.active() {
            if other_hash == hash
                || !other.tx.inputs().iter().any(|i| outpoints.contains(&i.outpoint()))
            {
                continue;
            }
            if !wins((status, seen), (other.status, other.seen)) {
                return Err(WalletError::ConflictLost {
                    winner: other.tx.txid(),
                });
            }
            rivals.push(*other_hash);
        }
        rivals.sort();

        let displaced = self.descendants(&rivals, true);
        for input in tx.inputs() {
            if displaced.contains(&input.prev_hash) {
                return Err(WalletError::Rejected(format!(
                    "spends an output of {}, which it double-spends",
                    txid(&input.prev_hash)
                )));
            }
            if self.txs.get(&input.prev_hash).is_some_and(|p| p.status.is_removed()) {
                return Err(WalletError::Rejected(format!(
                    "spends an output of removed transaction {}",
                    txid(&input.prev_hash)
                )));
            }
        }
        Ok(displaced)
    }

    fn add(
        &mut self,
        hash: UInt256,
        mut tx: Transaction,
        events: &mut Vec<WalletEvent>,
    ) -> Result<(), WalletError> {
        if tx.inputs().is_empty() || tx.outputs().is_empty() {
            return Err(WalletError::Rejected("transaction has no inputs or outputs".into()));
        }
        if !tx.is_signed() {
            return Err(WalletError::Rejected("transaction is not signed".into()));
        }

        let status = TxStatus::from_height(tx.block_height);
        if let Some(known) = self.txs.get(&hash) {
            if known.status.is_removed() {
                return self.revive(hash, status, tx.timestamp, events);
            }
            if status.is_confirmed() && known.status != status {
                self.set_status(hash, status, tx.timestamp, events);
            }
            return Ok(());
        }

        self.check_association(&tx)?;
        for (index, input) in tx.inputs().iter().enumerate() {
            if let Some(prev) = self.txs.get(&input.prev_hash) {
                if input.prev_index as usize >= prev.tx.outputs().len() {
                    return Err(WalletError::Rejected(format!(
                        "input {index} spends missing output {}:{}",
                        txid(&input.prev_hash),
                        input.prev_index
                    )));
                }
            }
        }

        let seen = self.next_seen;
        let displaced = self.resolve_conflicts(&hash, &tx, status, seen)?;

        // Fill in spent values the wire format does not carry.
        let amounts: Vec<Option<u64>> = tx
            .inputs()
            .iter()
            .map(|i| i.amount.or_else(|| self.prev_output(i).map(|o| o.0)))
            .collect();
        tx.fill_input_amounts(&amounts);

        self.next_seen += 1;
        debug!(txid = %tx.txid(), ?status, "transaction added");
        events.push(WalletEvent::TxAdded(tx.clone()));
        self.txs.insert(hash, TrackedTx { tx, status, seen });
        self.displace(&displaced, events);
        Ok(())
    }

    fn check_association(&self, tx: &Transaction) -> Result<(), WalletError> {
        let pays_wallet = tx.outputs().iter().any(|o| self.is_owned(&o.script_pubkey));
        let spends_wallet = tx.inputs().iter().any(|input| {
            claimed_script(input).is_some_and(|s| self.is_owned(&s))
                || self.prev_output(input).is_some_and(|(_, s)| self.is_owned(s))
        });
        if pays_wallet || spends_wallet {
            Ok(())
        } else {
            Err(WalletError::Rejected(format!(
                "{} does not touch this wallet",
                tx.txid()
            )))
        }
    }

    fn update(
        &mut self,
        hash: UInt256,
        height: Option<u32>,
        timestamp: u32,
        events: &mut Vec<WalletEvent>,
    ) -> Result<(), WalletError> {
        let current = match self.txs.get(&hash) {
            Some(tracked) => tracked.status,
            None => return Err(WalletError::UnknownTransaction(txid(&hash))),
        };
        let status = TxStatus::from_height(height);

        match current {
            TxStatus::Removed if height.is_none() => Ok(()),
            TxStatus::Removed => self.revive(hash, status, timestamp, events),
            _ if current == status => Ok(()),
            _ => {
                self.set_status(hash, status, timestamp, events);
                Ok(())
            }
        }
    }

    fn revive(
        &mut self,
        hash: UInt256,
        status: TxStatus,
        timestamp: u32,
        events: &mut Vec<WalletEvent>,
    ) -> Result<(), WalletError> {
        let seen = self.next_seen;
        let displaced = match self.txs.get(&hash) {
            Some(tracked) => self.resolve_conflicts(&hash, &tracked.tx, status, seen)?,
            None => return Err(WalletError::UnknownTransaction(txid(&hash))),
        };

        self.next_seen += 1;
        if let Some(tracked) = self.txs.get_mut(&hash) {
            tracked.seen = seen;
        }
        debug!(txid = %txid(&hash), ?status, "transaction revived");
        self.set_status(hash, status, timestamp, events);
        self.displace(&displaced, events);
        Ok(())
    }

    fn displace(&mut self, hashes: &[UInt256], events: &mut Vec<WalletEvent>) {
        for hash in hashes {
            debug!(txid = %txid(hash), "transaction displaced by a double spend");
            self.set_status(*hash, TxStatus::Removed, 0, events);
        }
    }

    fn set_status(
        &mut self,
        hash: UInt256,
        status: TxStatus,
        timestamp: u32,
        events: &mut Vec<WalletEvent>,
    ) {
        let addresses = match self.txs.get(&hash) {
            Some(tracked) => self.owned_addresses(&tracked.tx),
            None => return,
        };
        let Some(tracked) = self.txs.get_mut(&hash) else {
            return;
        };
        tracked.status = status;
        tracked.tx.block_height = status.height();
        if timestamp != 0 {
            tracked.tx.timestamp = timestamp;
        }

        events.push(WalletEvent::TxUpdated { hash, status });
        events.extend(addresses.into_iter().map(|address| WalletEvent::TxStatusUpdate {
            address,
            hash,
            status,
        }));
    }
}

/// Conflict policy between two transactions spending the same outpoint.
fn wins(challenger: (TxStatus, u64), incumbent: (TxStatus, u64)) -> bool {
    match (challenger.0.height(), incumbent.0.height()) {
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some(a), Some(b)) if a != b => a > b,
        _ => challenger.1 > incumbent.1,
    }
}

/// Lock script of the output an input claims to spend, from the input's
/// recorded previous script or the public key in its unlock script.
fn claimed_script(input: &TxInput) -> Option<Vec<u8>> {
    if let Some(script) = &input.script_pubkey {
        return Some(script.clone());
    }
    match script::classify_script_sig(input.script_sig.as_deref()?)? {
        ScriptTemplate::P2pkh(hash) => Some(script::p2pkh_script(&hash)),
        ScriptTemplate::P2sh(hash) => Some(script::p2sh_script(&hash)),
    }
}

fn slot(chain: SequenceChain) -> usize {
    chain.child_number() as usize
}

fn txid(hash: &UInt256) -> String {
    hash.reversed().to_hex()
}
