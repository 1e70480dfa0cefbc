//! The n-of-n checksig tapscript used by multi-party script-path leaves.
//!
//! ```text
//! <pk_1> OP_CHECKSIGVERIFY ... <pk_n-1> OP_CHECKSIGVERIFY <pk_n> OP_CHECKSIG
//! ```
//!
//! The interpreter pops `pk_1`'s signature first, so a satisfying witness
//! lists signatures in reverse key order: `[sig_n, ..., sig_1]`.

use bitcoin::opcodes::all::{OP_CHECKSIG, OP_CHECKSIGVERIFY};
use bitcoin::script::{Builder, Instruction};
use bitcoin::key::XOnlyPublicKey;
use bitcoin::{Script, ScriptBuf};

use crate::error::{Result, TaprootError};

pub fn build_n_of_n_tapscript(pubkeys: &[XOnlyPublicKey]) -> Result<ScriptBuf> {
    let Some((last, rest)) = pubkeys.split_last() else {
        return Err(TaprootError::InvalidArgument(
            "n-of-n tapscript needs at least one key".to_string(),
        ));
    };
    let mut builder = Builder::new();
    for key in rest {
        builder = builder.push_x_only_key(key).push_opcode(OP_CHECKSIGVERIFY);
    }
    Ok(builder.push_x_only_key(last).push_opcode(OP_CHECKSIG).into_script())
}

/// Extract the ordered keys of an n-of-n checksig tapscript.
pub fn parse_n_of_n_tapscript(script: &Script) -> Result<Vec<XOnlyPublicKey>> {
    let instructions = script
        .instructions()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TaprootError::InvalidTapscript(format!("decompile: {}", e)))?;
    if instructions.is_empty() || instructions.len() % 2 != 0 {
        return Err(TaprootError::InvalidTapscript(format!(
            "unexpected instruction count {}",
            instructions.len()
        )));
    }

    let count = instructions.len() / 2;
    let mut keys = Vec::with_capacity(count);
    for (i, pair) in instructions.chunks_exact(2).enumerate() {
        let key = match pair[0] {
            Instruction::PushBytes(bytes) if bytes.len() == 32 => {
                XOnlyPublicKey::from_slice(bytes.as_bytes())
                    .map_err(|e| TaprootError::InvalidTapscript(format!("key {}: {}", i, e)))?
            }
            _ => {
                return Err(TaprootError::InvalidTapscript(format!(
                    "expected 32-byte key push at position {}",
                    i
                )))
            }
        };
        let expected = if i + 1 == count {
            OP_CHECKSIG
        } else {
            OP_CHECKSIGVERIFY
        };
        if pair[1] != Instruction::Op(expected) {
            return Err(TaprootError::InvalidTapscript(format!(
                "expected {:?} after key {}",
                expected, i
            )));
        }
        keys.push(key);
    }
    Ok(keys)
}
