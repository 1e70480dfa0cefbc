//! Script-path control blocks.
//!
//! ```text
//! [leaf_version | parity] [internal key: 32] [path: 32 * m]     0 <= m <= 128
//! ```

use bitcoin::hashes::Hash;
use bitcoin::key::{Parity, XOnlyPublicKey};
use bitcoin::taproot::{TapLeafHash, TapNodeHash};
use bitcoin::Script;

use crate::error::{Result, TaprootError};
use crate::hash::{hash_tap_branch, hash_tap_leaf};
use crate::taptree::TAPROOT_CONTROL_MAX_NODE_COUNT;
use crate::tweak::tap_tweak_pubkey;

pub const TAPROOT_CONTROL_BASE_SIZE: usize = 33;
pub const TAPROOT_CONTROL_NODE_SIZE: usize = 32;
pub const TAPROOT_CONTROL_MAX_SIZE: usize =
    TAPROOT_CONTROL_BASE_SIZE + TAPROOT_CONTROL_NODE_SIZE * TAPROOT_CONTROL_MAX_NODE_COUNT;

/// First byte of an annex. Also forbidden as a leaf version so the two
/// cannot be confused.
pub const ANNEX_TAG: u8 = 0x50;

const LEAF_VERSION_MASK: u8 = 0xfe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub parity: Parity,
    pub internal_pubkey: XOnlyPublicKey,
    pub leaf_version: u8,
    pub path: Vec<TapNodeHash>,
}

impl ControlBlock {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TAPROOT_CONTROL_BASE_SIZE
            || bytes.len() > TAPROOT_CONTROL_MAX_SIZE
            || (bytes.len() - 1) % TAPROOT_CONTROL_NODE_SIZE != 0
        {
            return Err(TaprootError::InvalidControlBlock(format!(
                "invalid length {}",
                bytes.len()
            )));
        }

        let parity = if bytes[0] & 1 == 1 {
            Parity::Odd
        } else {
            Parity::Even
        };
        let leaf_version = bytes[0] & LEAF_VERSION_MASK;
        if leaf_version == ANNEX_TAG {
            return Err(TaprootError::InvalidControlBlock(format!(
                "invalid leaf version 0x{:02x}",
                leaf_version
            )));
        }

        let internal_pubkey = XOnlyPublicKey::from_slice(&bytes[1..TAPROOT_CONTROL_BASE_SIZE])
            .map_err(|e| TaprootError::InvalidControlBlock(format!("internal pubkey: {}", e)))?;

        let path = bytes[TAPROOT_CONTROL_BASE_SIZE..]
            .chunks_exact(TAPROOT_CONTROL_NODE_SIZE)
            .map(|chunk| {
                let mut node = [0u8; 32];
                node.copy_from_slice(chunk);
                TapNodeHash::from_byte_array(node)
            })
            .collect();

        Ok(ControlBlock {
            parity,
            internal_pubkey,
            leaf_version,
            path,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        serialize_control_block(
            self.parity,
            &self.internal_pubkey,
            &self.path,
            self.leaf_version,
        )
    }

    pub fn tapleaf_hash(&self, tapscript: &Script) -> TapLeafHash {
        hash_tap_leaf(tapscript, self.leaf_version)
    }

    /// Fold the path upward from the leaf. Pass `leaf_hash` to skip
    /// rehashing the script.
    pub fn taptree_root(&self, tapscript: &Script, leaf_hash: Option<TapLeafHash>) -> TapNodeHash {
        let leaf_hash = leaf_hash.unwrap_or_else(|| self.tapleaf_hash(tapscript));
        self.path
            .iter()
            .fold(TapNodeHash::from(leaf_hash), |node, sibling| {
                hash_tap_branch(&node, sibling)
            })
    }

    /// Whether this control block proves `tapscript` is committed to by
    /// `output_key`.
    pub fn verify_taproot_commitment(
        &self,
        output_key: &XOnlyPublicKey,
        tapscript: &Script,
    ) -> Result<bool> {
        let root = self.taptree_root(tapscript, None);
        let tweaked = tap_tweak_pubkey(&self.internal_pubkey, Some(&root))?;
        Ok(tweaked.output_key == *output_key && tweaked.parity == self.parity)
    }
}

pub fn serialize_control_block(
    parity: Parity,
    internal_pubkey: &XOnlyPublicKey,
    path: &[TapNodeHash],
    leaf_version: u8,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(TAPROOT_CONTROL_BASE_SIZE + path.len() * TAPROOT_CONTROL_NODE_SIZE);
    out.push(leaf_version | parity.to_u8());
    out.extend_from_slice(&internal_pubkey.serialize());
    for node in path {
        out.extend_from_slice(node.as_byte_array());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::TAPSCRIPT_LEAF_VERSION;
    use crate::keyagg::aggregate_musig_pubkeys;
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
    use bitcoin::taproot::{LeafVersion, TaprootBuilder};
    use bitcoin::ScriptBuf;

    fn test_pubkey(seed_byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let mut secret_bytes = [0u8; 32];
        secret_bytes[31] = seed_byte;
        secret_bytes[0] = 0x01;
        SecretKey::from_slice(&secret_bytes)
            .unwrap()
            .public_key(&secp)
    }

    fn agg12() -> XOnlyPublicKey {
        aggregate_musig_pubkeys(&[test_pubkey(1), test_pubkey(2)]).unwrap()
    }

    #[test]
    fn test_serialize_pinned_vector() {
        let bytes = serialize_control_block(
            Parity::Odd,
            &agg12(),
            &[
                TapNodeHash::from_byte_array([0x11; 32]),
                TapNodeHash::from_byte_array([0x22; 32]),
            ],
            TAPSCRIPT_LEAF_VERSION,
        );
        let expected = format!(
            "c18b1fd486b7e6ac21ff138e3767529e64b1989dd8056d8c86da454b2f96792db8{}{}",
            "11".repeat(32),
            "22".repeat(32)
        );
        assert_eq!(bytes.len(), 97);
        assert_eq!(hex::encode(&bytes), expected);
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let bytes = serialize_control_block(
            Parity::Odd,
            &agg12(),
            &[TapNodeHash::from_byte_array([0x11; 32])],
            TAPSCRIPT_LEAF_VERSION,
        );
        let cb = ControlBlock::parse(&bytes).unwrap();
        assert_eq!(cb.parity, Parity::Odd);
        assert_eq!(cb.leaf_version, TAPSCRIPT_LEAF_VERSION);
        assert_eq!(cb.internal_pubkey, agg12());
        assert_eq!(cb.path.len(), 1);
        assert_eq!(cb.serialize(), bytes);
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        let mut bytes = vec![0xc0];
        bytes.extend_from_slice(&agg12().serialize());
        assert!(ControlBlock::parse(&bytes[..32]).is_err());
        bytes.push(0x00);
        assert!(ControlBlock::parse(&bytes).is_err());

        let mut too_deep = bytes[..33].to_vec();
        too_deep.extend(vec![0x11; 32 * 129]);
        assert!(ControlBlock::parse(&too_deep).is_err());
        too_deep.truncate(33 + 32 * 128);
        assert!(ControlBlock::parse(&too_deep).is_ok());
    }

    #[test]
    fn test_parse_rejects_annex_leaf_version() {
        for first in [0x50u8, 0x51] {
            let mut bytes = vec![first];
            bytes.extend_from_slice(&agg12().serialize());
            let err = ControlBlock::parse(&bytes).unwrap_err();
            assert!(matches!(err, TaprootError::InvalidControlBlock(_)));
        }
    }

    #[test]
    fn test_parse_rejects_invalid_internal_key() {
        // x >= p is not a field element
        let mut bytes = vec![0xc0];
        bytes.extend_from_slice(&[0xff; 32]);
        assert!(ControlBlock::parse(&bytes).is_err());
    }

    #[test]
    fn test_matches_rust_bitcoin_control_block() {
        let secp = Secp256k1::new();
        let scripts: Vec<ScriptBuf> = (1..=3u8)
            .map(|n| ScriptBuf::from_bytes(vec![0x50 + n, 0x75, 0x51]))
            .collect();
        let spend_info = TaprootBuilder::new()
            .add_leaf(1, scripts[0].clone())
            .unwrap()
            .add_leaf(2, scripts[1].clone())
            .unwrap()
            .add_leaf(2, scripts[2].clone())
            .unwrap()
            .finalize(&secp, agg12())
            .unwrap();

        for script in &scripts {
            let theirs = spend_info
                .control_block(&(script.clone(), LeafVersion::TapScript))
                .unwrap();
            let ours = ControlBlock::parse(&theirs.serialize()).unwrap();
            assert_eq!(ours.serialize(), theirs.serialize());
            assert_eq!(ours.taptree_root(script, None), spend_info.merkle_root().unwrap());
            assert!(ours
                .verify_taproot_commitment(&spend_info.output_key().to_inner(), script)
                .unwrap());
            assert!(!ours
                .verify_taproot_commitment(&agg12(), script)
                .unwrap());
        }
    }

    #[test]
    fn test_taptree_root_with_precomputed_leaf_hash() {
        let script = ScriptBuf::from_bytes(vec![0x51]);
        let cb = ControlBlock {
            parity: Parity::Even,
            internal_pubkey: agg12(),
            leaf_version: TAPSCRIPT_LEAF_VERSION,
            path: vec![TapNodeHash::from_byte_array([0x33; 32])],
        };
        let leaf_hash = cb.tapleaf_hash(&script);
        assert_eq!(leaf_hash, TapLeafHash::from_script(&script, LeafVersion::TapScript));
        assert_eq!(
            cb.taptree_root(&script, Some(leaf_hash)),
            cb.taptree_root(&script, None)
        );
    }
}
