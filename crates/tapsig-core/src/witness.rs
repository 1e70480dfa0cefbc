//! Classification of taproot (witness v1) spend stacks.

use bitcoin::sighash::TapSighashType;
use bitcoin::{Script, ScriptBuf, Witness};

use crate::control_block::{ControlBlock, ANNEX_TAG};
use crate::error::{Result, TaprootError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedWitness {
    KeyPath {
        signature: Vec<u8>,
        annex: Option<Vec<u8>>,
    },
    ScriptPath {
        /// Stack elements consumed by the tapscript.
        script_sig: Vec<Vec<u8>>,
        tapscript: ScriptBuf,
        control_block: ControlBlock,
        annex: Option<Vec<u8>>,
    },
}

impl ParsedWitness {
    pub fn is_key_path(&self) -> bool {
        matches!(self, ParsedWitness::KeyPath { .. })
    }

    pub fn annex(&self) -> Option<&[u8]> {
        match self {
            ParsedWitness::KeyPath { annex, .. } | ParsedWitness::ScriptPath { annex, .. } => {
                annex.as_deref()
            }
        }
    }
}

/// Split a taproot witness stack into its key-path or script-path parts.
pub fn parse_taproot_witness<T: AsRef<[u8]>>(witness: &[T]) -> Result<ParsedWitness> {
    let mut stack: Vec<&[u8]> = witness.iter().map(AsRef::as_ref).collect();
    if stack.is_empty() {
        return Err(TaprootError::InvalidWitness("empty witness stack".to_string()));
    }

    let annex = if stack.len() >= 2 && stack.last().and_then(|e| e.first()) == Some(&ANNEX_TAG) {
        stack.pop().map(<[u8]>::to_vec)
    } else {
        None
    };

    if let [signature] = stack.as_slice() {
        if !is_canonical_schnorr_signature(signature) {
            return Err(TaprootError::InvalidWitness(format!(
                "key-path signature is not a canonical schnorr signature ({} bytes)",
                signature.len()
            )));
        }
        return Ok(ParsedWitness::KeyPath {
            signature: signature.to_vec(),
            annex,
        });
    }

    let (control_block, rest) = stack
        .split_last()
        .ok_or_else(|| TaprootError::InvalidWitness("missing control block".to_string()))?;
    let (tapscript, script_sig) = rest
        .split_last()
        .ok_or_else(|| TaprootError::InvalidWitness("missing tapscript".to_string()))?;

    let control_block = ControlBlock::parse(control_block)?;
    let tapscript = Script::from_bytes(tapscript);
    let decoded = tapscript
        .instructions()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TaprootError::InvalidWitness(format!("tapscript does not decompile: {}", e)))?;
    if decoded.is_empty() {
        return Err(TaprootError::InvalidWitness("empty tapscript".to_string()));
    }

    Ok(ParsedWitness::ScriptPath {
        script_sig: script_sig.iter().map(|e| e.to_vec()).collect(),
        tapscript: tapscript.to_owned(),
        control_block,
        annex,
    })
}

pub fn parse_witness(witness: &Witness) -> Result<ParsedWitness> {
    let stack: Vec<&[u8]> = witness.iter().collect();
    parse_taproot_witness(&stack)
}

/// 64 bytes, or 65 with an explicit non-default sighash type.
pub fn is_canonical_schnorr_signature(sig: &[u8]) -> bool {
    match sig.len() {
        64 => true,
        65 => sig[64] != 0x00 && TapSighashType::from_consensus_u8(sig[64]).is_ok(),
        _ => false,
    }
}
