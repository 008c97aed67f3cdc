use crate::error::BtcError;
use crate::transaction::{estimate_fee, OutPoint};

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    /// Value in satoshis.
    pub amount: u64,
    /// The locking script (scriptPubKey) serialized bytes.
    pub script_pubkey: Vec<u8>,
}

/// Result of UTXO selection: the chosen UTXOs, their aggregate value and the
/// fee estimated for spending them.
#[derive(Debug, Clone)]
pub struct UtxoSelection {
    pub selected: Vec<Utxo>,
    pub total: u64,
    pub fee: u64,
}

impl UtxoSelection {
    /// What is left for a change output after paying `target` and the fee.
    pub fn change(&self, target: u64) -> u64 {
        self.total.saturating_sub(target.saturating_add(self.fee))
    }
}

/// Select UTXOs to cover `target` plus the fee.
///
/// Largest-first: outputs are taken in descending value order until the
/// running total pays for the target and a P2PKH transaction with the
/// selected inputs and two outputs (recipient + change).
pub fn select_utxos(utxos: &[Utxo], target: u64, fee_per_kb: u64) -> Result<UtxoSelection, BtcError> {
    let mut sorted: Vec<&Utxo> = utxos.iter().collect();
    sorted.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.outpoint.cmp(&b.outpoint)));

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total: u64 = 0;
    let mut fee = estimate_fee(0, 2, fee_per_kb);

    for utxo in sorted {
        selected.push(utxo.clone());
        total = total.saturating_add(utxo.amount);
        fee = estimate_fee(selected.len(), 2, fee_per_kb);
        if total >= target.saturating_add(fee) {
            return Ok(UtxoSelection {
                selected,
                total,
                fee,
            });
        }
    }

    Err(BtcError::InsufficientFunds {
        needed: target.saturating_add(fee),
        available: total,
    })
}
