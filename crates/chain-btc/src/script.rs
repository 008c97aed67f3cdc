//! Standard script templates and push-data parsing.

use crypto_utils::{hash160, UInt160};

use crate::error::BtcError;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// One parsed script element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptElement<'a> {
    Op(u8),
    Push(&'a [u8]),
}

/// Lock script templates the wallet understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    P2pkh(UInt160),
    P2sh(UInt160),
}

/// OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script(pubkey_hash: &UInt160) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(pubkey_hash.as_bytes());
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// OP_HASH160 <20-byte hash> OP_EQUAL
pub fn p2sh_script(script_hash: &UInt160) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(script_hash.as_bytes());
    script.push(OP_EQUAL);
    script
}

/// Appends a minimal push of `data`.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= u8::MAX as usize {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= u16::MAX as usize {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// P2PKH unlock script: <signature + hashtype> <public key>
pub fn p2pkh_script_sig(signature: &[u8], pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(signature.len() + pubkey.len() + 2);
    push_data(&mut script, signature);
    push_data(&mut script, pubkey);
    script
}

/// Splits a script into opcodes and pushed data.
pub fn script_elements(script: &[u8]) -> Result<Vec<ScriptElement<'_>>, BtcError> {
    let mut elements = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let op = script[pos];
        pos += 1;

        let len = match op {
            1..=0x4b => op as usize,
            OP_PUSHDATA1 => read_len(script, &mut pos, 1)?,
            OP_PUSHDATA2 => read_len(script, &mut pos, 2)?,
            OP_PUSHDATA4 => read_len(script, &mut pos, 4)?,
            _ => {
                elements.push(ScriptElement::Op(op));
                continue;
            }
        };

        let end = pos
            .checked_add(len)
            .filter(|&end| end <= script.len())
            .ok_or_else(|| BtcError::InvalidScript(format!("push of {len} bytes overruns script")))?;
        elements.push(ScriptElement::Push(&script[pos..end]));
        pos = end;
    }

    Ok(elements)
}

fn read_len(script: &[u8], pos: &mut usize, width: usize) -> Result<usize, BtcError> {
    let bytes = script
        .get(*pos..*pos + width)
        .ok_or_else(|| BtcError::InvalidScript("truncated push length".into()))?;
    *pos += width;
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf) as usize)
}

/// Recognizes a P2PKH or P2SH lock script.
pub fn classify(script_pubkey: &[u8]) -> Option<ScriptTemplate> {
    match script_pubkey {
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            UInt160::from_slice(hash).ok().map(ScriptTemplate::P2pkh)
        }
        [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            UInt160::from_slice(hash).ok().map(ScriptTemplate::P2sh)
        }
        _ => None,
    }
}

/// Infers the spent template from an unlock script.
///
/// A trailing public key means P2PKH. Otherwise a trailing push after at
/// least one other push is taken as a P2SH redeem script.
pub fn classify_script_sig(script_sig: &[u8]) -> Option<ScriptTemplate> {
    let elements = script_elements(script_sig).ok()?;
    let pushes: Vec<&[u8]> = elements
        .iter()
        .filter_map(|e| match e {
            ScriptElement::Push(data) => Some(*data),
            ScriptElement::Op(_) => None,
        })
        .collect();
    let last = *pushes.last()?;

    if is_pubkey(last) {
        Some(ScriptTemplate::P2pkh(hash160(last)))
    } else if pushes.len() >= 2 || elements.first() == Some(&ScriptElement::Op(OP_0)) {
        Some(ScriptTemplate::P2sh(hash160(last)))
    } else {
        None
    }
}

fn is_pubkey(data: &[u8]) -> bool {
    matches!((data.len(), data.first()), (33, Some(0x02 | 0x03)) | (65, Some(0x04)))
}
