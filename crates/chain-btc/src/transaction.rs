//! Legacy (pre-segwit) transactions: construction, wire format, the
//! original signature-hash algorithm and P2PKH signing.

use crypto_utils::{sha256d, UInt256};

use crate::address::Address;
use crate::error::BtcError;
use crate::key::Key;
use crate::network::BtcNetwork;
use crate::script::{self, ScriptTemplate};

pub const TX_VERSION: u32 = 1;
pub const TXIN_SEQUENCE: u32 = u32::MAX;
pub const SIGHASH_ALL: u32 = 0x01;

/// 21 million BTC in satoshis.
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

pub const TX_FEE_PER_KB: u64 = 5_000;

/// Estimated size of a signed P2PKH input with a compressed key.
pub const TX_INPUT_SIZE: usize = 148;
/// Size of a P2PKH output.
pub const TX_OUTPUT_SIZE: usize = 34;

/// Outputs below this are dust: spending them costs more than a third of their value.
pub const TX_MIN_OUTPUT_AMOUNT: u64 =
    TX_FEE_PER_KB * 3 * (TX_OUTPUT_SIZE + TX_INPUT_SIZE) as u64 / 1000;

pub const TX_MAX_SIZE: usize = 100_000;

/// Lock times below this are block heights, above it unix timestamps.
pub const TX_MAX_LOCK_HEIGHT: u32 = 500_000_000;

/// Reference to one output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    /// Transaction hash in internal byte order.
    pub hash: UInt256,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_hash: UInt256,
    pub prev_index: u32,
    /// Lock script of the spent output, needed to sign. Unknown for parsed inputs.
    pub script_pubkey: Option<Vec<u8>>,
    /// Unlock script; `None` until signed.
    pub script_sig: Option<Vec<u8>>,
    pub sequence: u32,
    /// Value of the spent output, when known.
    pub amount: Option<u64>,
}

impl TxInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            hash: self.prev_hash,
            index: self.prev_index,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.script_sig.is_some()
    }

    /// Address whose output this input claims to spend.
    pub fn address(&self, network: BtcNetwork) -> Option<Address> {
        self.script_pubkey
            .as_deref()
            .and_then(|s| Address::from_script_pubkey(s, network))
            .or_else(|| {
                self.script_sig
                    .as_deref()
                    .and_then(|s| Address::from_script_sig(s, network))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn address(&self, network: BtcNetwork) -> Option<Address> {
        Address::from_script_pubkey(&self.script_pubkey, network)
    }
}

/// A transaction plus the wallet-side metadata `block_height` and `timestamp`,
/// neither of which is part of the serialization or the hash.
///
/// Inputs and outputs can only be appended while at least one input is
/// unsigned; once every input carries an unlock script the transaction is
/// frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    /// Height of the confirming block; `None` while unconfirmed.
    pub block_height: Option<u32>,
    /// Unix time the transaction was confirmed or first seen, 0 if unknown.
    pub timestamp: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Empty unsigned template.
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            block_height: None,
            timestamp: 0,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    /// Appends an unsigned input spending `prev_hash:prev_index`.
    pub fn add_input(
        &mut self,
        prev_hash: UInt256,
        prev_index: u32,
        script_pubkey: Vec<u8>,
        amount: u64,
    ) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        check_amount(amount)?;
        let outpoint = OutPoint {
            hash: prev_hash,
            index: prev_index,
        };
        if self.inputs.iter().any(|i| i.outpoint() == outpoint) {
            return Err(BtcError::TransactionBuildError(format!(
                "input {}:{prev_index} is already spent by this transaction",
                prev_hash.reversed()
            )));
        }
        self.inputs.push(TxInput {
            prev_hash,
            prev_index,
            script_pubkey: Some(script_pubkey),
            script_sig: None,
            sequence: TXIN_SEQUENCE,
            amount: Some(amount),
        });
        Ok(())
    }

    pub fn add_output(&mut self, amount: u64, script_pubkey: Vec<u8>) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        check_amount(amount)?;
        if script_pubkey.is_empty() {
            return Err(BtcError::InvalidScript("output lock script is empty".into()));
        }
        self.outputs.push(TxOutput {
            amount,
            script_pubkey,
        });
        Ok(())
    }

    pub fn add_output_to(&mut self, amount: u64, address: &Address) -> Result<(), BtcError> {
        self.add_output(amount, address.script_pubkey())
    }

    pub fn set_lock_time(&mut self, lock_time: u32) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        self.lock_time = lock_time;
        Ok(())
    }

    /// Sets the sequence number of input `index`. Any value below
    /// [`TXIN_SEQUENCE`] makes the lock time binding.
    pub fn set_sequence(&mut self, index: usize, sequence: u32) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        let input = self.inputs.get_mut(index).ok_or_else(|| {
            BtcError::TransactionBuildError(format!("no input at index {index}"))
        })?;
        input.sequence = sequence;
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), BtcError> {
        if self.is_signed() {
            return Err(BtcError::AlreadySigned);
        }
        Ok(())
    }

    /// Records spent-output values learned elsewhere, such as for a parsed
    /// transaction. Values already known are kept.
    pub fn fill_input_amounts(&mut self, amounts: &[Option<u64>]) {
        for (input, amount) in self.inputs.iter_mut().zip(amounts) {
            if input.amount.is_none() {
                input.amount = *amount;
            }
        }
    }

    /// True when there is at least one input and every input is signed.
    pub fn is_signed(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(TxInput::is_signed)
    }

    /// Structural validity: inputs and outputs present, fully signed, within
    /// the size limit, and not paying out more than the known input value.
    pub fn is_valid(&self) -> bool {
        if self.inputs.is_empty() || self.outputs.is_empty() || !self.is_signed() {
            return false;
        }
        if self.size() > TX_MAX_SIZE || self.outputs.iter().any(|o| o.amount > MAX_MONEY) {
            return false;
        }
        match self.input_total() {
            Some(total_in) => self.output_total() <= total_in,
            None => true,
        }
    }

    /// Sum of input values, if every input's value is known.
    pub fn input_total(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.amount?))
    }

    pub fn output_total(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    /// sha256d of the serialization, internal byte order.
    pub fn hash(&self) -> UInt256 {
        sha256d(&self.serialize())
    }

    /// Hash in the reversed hex form block explorers display.
    pub fn txid(&self) -> String {
        self.hash().reversed().to_hex()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(input.prev_hash.as_bytes());
            buf.extend_from_slice(&input.prev_index.to_le_bytes());
            let script_sig = input.script_sig.as_deref().unwrap_or_default();
            write_compact_size(&mut buf, script_sig.len() as u64);
            buf.extend_from_slice(script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_outputs(&mut buf, &self.outputs);
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Parses a legacy wire-format transaction. Trailing bytes are an error.
    pub fn parse(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut reader = Reader::new(bytes);
        let version = reader.u32_le()?;

        let input_count = reader.count(41)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let prev_hash = UInt256::from_slice(reader.take(32)?)?;
            let prev_index = reader.u32_le()?;
            let script_len = reader.count(1)?;
            let script_sig = reader.take(script_len)?.to_vec();
            let sequence = reader.u32_le()?;
            inputs.push(TxInput {
                prev_hash,
                prev_index,
                script_pubkey: None,
                script_sig: (!script_sig.is_empty()).then_some(script_sig),
                sequence,
                amount: None,
            });
        }

        let output_count = reader.count(9)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let amount = reader.u64_le()?;
            let script_len = reader.count(1)?;
            let script_pubkey = reader.take(script_len)?.to_vec();
            outputs.push(TxOutput {
                amount,
                script_pubkey,
            });
        }

        let lock_time = reader.u32_le()?;
        if !reader.is_empty() {
            return Err(BtcError::Parse(format!(
                "{} trailing bytes after lock time",
                reader.remaining()
            )));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            block_height: None,
            timestamp: 0,
        })
    }

    /// Legacy SIGHASH_ALL digest for input `index`.
    pub fn sighash(&self, index: usize) -> Result<UInt256, BtcError> {
        let input = self.inputs.get(index).ok_or_else(|| {
            BtcError::TransactionBuildError(format!("no input at index {index}"))
        })?;
        let script_code = input.script_pubkey.as_deref().ok_or_else(|| {
            BtcError::TransactionBuildError(format!("input {index} has no previous output script"))
        })?;

        let mut buf = Vec::with_capacity(self.size() + 4);
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for (i, other) in self.inputs.iter().enumerate() {
            buf.extend_from_slice(other.prev_hash.as_bytes());
            buf.extend_from_slice(&other.prev_index.to_le_bytes());
            if i == index {
                write_compact_size(&mut buf, script_code.len() as u64);
                buf.extend_from_slice(script_code);
            } else {
                write_compact_size(&mut buf, 0);
            }
            buf.extend_from_slice(&other.sequence.to_le_bytes());
        }
        write_outputs(&mut buf, &self.outputs);
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf.extend_from_slice(&SIGHASH_ALL.to_le_bytes());

        Ok(sha256d(&buf))
    }

    /// Signs every unsigned P2PKH input with the key whose public key hash
    /// matches the spent output.
    ///
    /// Either all unsigned inputs get signed or the transaction is left as it was.
    pub fn sign(&mut self, keys: &[Key]) -> Result<(), BtcError> {
        if self.inputs.is_empty() {
            return Err(BtcError::TransactionBuildError("no inputs to sign".into()));
        }
        self.ensure_mutable()?;

        let mut script_sigs = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            if input.is_signed() {
                continue;
            }
            let pubkey_hash = match input.script_pubkey.as_deref().and_then(script::classify) {
                Some(ScriptTemplate::P2pkh(hash)) => hash,
                Some(ScriptTemplate::P2sh(_)) => {
                    return Err(BtcError::InvalidScript(format!(
                        "input {index} spends a P2SH output"
                    )))
                }
                None => {
                    return Err(BtcError::TransactionBuildError(format!(
                        "input {index} has no standard previous output script"
                    )))
                }
            };

            let key = keys
                .iter()
                .find(|k| k.has_secret() && k.hash160() == Some(pubkey_hash))
                .ok_or_else(|| {
                    let network = keys.first().map(Key::network).unwrap_or_default();
                    BtcError::MissingKey {
                        index,
                        address: Address::p2pkh(pubkey_hash, network).to_string(),
                    }
                })?;

            let mut signature = key.sign(self.sighash(index)?)?;
            signature.push(SIGHASH_ALL as u8);
            script_sigs.push((index, script::p2pkh_script_sig(&signature, &key.pubkey())));
        }

        let signed = script_sigs.len();
        for (index, script_sig) in script_sigs {
            self.inputs[index].script_sig = Some(script_sig);
        }
        tracing::debug!(txid = %self.txid(), inputs = signed, "signed transaction");
        Ok(())
    }

    /// Serialized size; unsigned inputs count as [`TX_INPUT_SIZE`].
    pub fn size(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| match &i.script_sig {
                Some(sig) => 32 + 4 + compact_size_len(sig.len() as u64) + sig.len() + 4,
                None => TX_INPUT_SIZE,
            })
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 8 + compact_size_len(o.script_pubkey.len() as u64) + o.script_pubkey.len())
            .sum();

        8 + compact_size_len(self.inputs.len() as u64)
            + compact_size_len(self.outputs.len() as u64)
            + inputs
            + outputs
    }

    /// Minimum relay fee at [`TX_FEE_PER_KB`].
    pub fn standard_fee(&self) -> u64 {
        fee_for_size(self.size(), TX_FEE_PER_KB)
    }
}

/// Fee for `size` bytes, charged per started kilobyte.
pub fn fee_for_size(size: usize, fee_per_kb: u64) -> u64 {
    (size as u64).div_ceil(1000) * fee_per_kb
}

/// Estimate the fee for a P2PKH transaction before it is built.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_per_kb: u64) -> u64 {
    let size = 8
        + compact_size_len(num_inputs as u64)
        + compact_size_len(num_outputs as u64)
        + num_inputs * TX_INPUT_SIZE
        + num_outputs * TX_OUTPUT_SIZE;
    fee_for_size(size, fee_per_kb)
}

fn check_amount(amount: u64) -> Result<(), BtcError> {
    if amount > MAX_MONEY {
        return Err(BtcError::InvalidAmount(format!(
            "{amount} sat exceeds the {MAX_MONEY} sat supply"
        )));
    }
    Ok(())
}

fn write_outputs(buf: &mut Vec<u8>, outputs: &[TxOutput]) {
    write_compact_size(buf, outputs.len() as u64);
    for output in outputs {
        buf.extend_from_slice(&output.amount.to_le_bytes());
        write_compact_size(buf, output.script_pubkey.len() as u64);
        buf.extend_from_slice(&output.script_pubkey);
    }
}

/// Write a Bitcoin-style CompactSize (variable-length integer).
fn write_compact_size(buf: &mut Vec<u8>, val: u64) {
    if val < 0xFD {
        buf.push(val as u8);
    } else if val <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(val as u16).to_le_bytes());
    } else if val <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(val as u32).to_le_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&val.to_le_bytes());
    }
}

fn compact_size_len(val: u64) -> usize {
    match val {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BtcError> {
        if n > self.remaining() {
            return Err(BtcError::Parse(format!(
                "needed {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32_le(&mut self) -> Result<u32, BtcError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64_le(&mut self) -> Result<u64, BtcError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn compact_size(&mut self) -> Result<u64, BtcError> {
        let first = self.take(1)?[0];
        Ok(match first {
            0xFD => {
                let mut b = [0u8; 2];
                b.copy_from_slice(self.take(2)?);
                u16::from_le_bytes(b) as u64
            }
            0xFE => self.u32_le()? as u64,
            0xFF => self.u64_le()?,
            n => n as u64,
        })
    }

    /// Reads a count of items that each occupy at least `min_item_size`
    /// bytes, rejecting counts the remaining input cannot hold.
    fn count(&mut self, min_item_size: usize) -> Result<usize, BtcError> {
        let n = self.compact_size()?;
        let max = (self.remaining() / min_item_size.max(1)) as u64;
        if n > max {
            return Err(BtcError::Parse(format!(
                "count {n} exceeds the {} bytes left",
                self.remaining()
            )));
        }
        Ok(n as usize)
    }
}
