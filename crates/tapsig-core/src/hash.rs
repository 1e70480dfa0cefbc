//! BIP-340 tagged hashes and the BIP-341 leaf/branch hashes built on them.
//!
//! `tagged_hash(tag, m) = SHA256(SHA256(tag) || SHA256(tag) || m)`
//!
//! Every hash in this crate goes through [`tagged_hash`] with one of the
//! fixed tags below. A wrong tag produces a silently different hash, so
//! callers should always use the constants.

use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::taproot::{TapLeafHash, TapNodeHash};
use bitcoin::Script;

pub const TAG_TAP_LEAF: &str = "TapLeaf";
pub const TAG_TAP_BRANCH: &str = "TapBranch";
pub const TAG_TAP_TWEAK: &str = "TapTweak";
pub const TAG_KEYAGG_LIST: &str = "KeyAgg list";
pub const TAG_KEYAGG_COEFFICIENT: &str = "KeyAgg coefficient";

/// Leaf version of BIP-342 tapscript.
pub const TAPSCRIPT_LEAF_VERSION: u8 = 0xc0;

/// Domain-separated SHA256.
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_byte_array());
    engine.input(tag_hash.as_byte_array());
    engine.input(data);
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// Script bytes prefixed with their CompactSize length.
pub fn serialize_script(script: &Script) -> Vec<u8> {
    let mut out = serialize(&VarInt(script.len() as u64));
    out.extend_from_slice(script.as_bytes());
    out
}

/// `TapLeaf(leaf_version || compact_size(script) || script)`
pub fn hash_tap_leaf(script: &Script, leaf_version: u8) -> TapLeafHash {
    let mut data = vec![leaf_version];
    data.extend(serialize_script(script));
    TapLeafHash::from_byte_array(tagged_hash(TAG_TAP_LEAF, &data))
}

/// `TapBranch(min(a, b) || max(a, b))`
///
/// Children are ordered by byte value, not by their position in the tree.
pub fn hash_tap_branch(a: &TapNodeHash, b: &TapNodeHash) -> TapNodeHash {
    let (a, b) = (a.as_byte_array(), b.as_byte_array());
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(lo);
    data[32..].copy_from_slice(hi);
    TapNodeHash::from_byte_array(tagged_hash(TAG_TAP_BRANCH, &data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::key::XOnlyPublicKey;
    use bitcoin::taproot::{LeafVersion, TapTweakHash};
    use bitcoin::ScriptBuf;

    #[test]
    fn test_tagged_hash_matches_bip340_construction() {
        let tag = sha256::Hash::hash(b"TapLeaf").to_byte_array();
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&tag);
        preimage.extend_from_slice(&tag);
        preimage.extend_from_slice(b"hello");
        let expected = sha256::Hash::hash(&preimage).to_byte_array();

        assert_eq!(tagged_hash("TapLeaf", b"hello"), expected);
    }

    #[test]
    fn test_tags_are_domain_separated() {
        assert_ne!(
            tagged_hash(TAG_TAP_LEAF, &[0u8; 32]),
            tagged_hash(TAG_TAP_BRANCH, &[0u8; 32])
        );
    }

    #[test]
    fn test_leaf_hash_matches_rust_bitcoin() {
        let script = ScriptBuf::from_bytes(vec![0x51]);
        assert_eq!(
            hash_tap_leaf(&script, TAPSCRIPT_LEAF_VERSION),
            TapLeafHash::from_script(&script, LeafVersion::TapScript)
        );
    }

    #[test]
    fn test_leaf_hash_long_script_uses_compact_size() {
        // 300 bytes needs the 0xfd CompactSize prefix
        let script = ScriptBuf::from_bytes(vec![0x61; 300]);
        assert_eq!(serialize_script(&script)[..3], [0xfd, 0x2c, 0x01]);
        assert_eq!(
            hash_tap_leaf(&script, TAPSCRIPT_LEAF_VERSION),
            TapLeafHash::from_script(&script, LeafVersion::TapScript)
        );
    }

    #[test]
    fn test_branch_hash_is_order_independent() {
        let a = TapNodeHash::from_byte_array([0x11; 32]);
        let b = TapNodeHash::from_byte_array([0x22; 32]);
        assert_eq!(hash_tap_branch(&a, &b), hash_tap_branch(&b, &a));
        assert_eq!(hash_tap_branch(&a, &b), TapNodeHash::from_node_hashes(a, b));
    }

    #[test]
    fn test_tweak_tag_matches_rust_bitcoin() {
        let key = XOnlyPublicKey::from_slice(
            &hex::decode("e4dbb4350d84eabec1d67e40a398a78a8e6d719d86914393fca83b88dbe927af")
                .unwrap(),
        )
        .unwrap();
        let root = TapNodeHash::from_byte_array([0xab; 32]);

        let mut data = key.serialize().to_vec();
        data.extend_from_slice(root.as_byte_array());

        assert_eq!(
            tagged_hash(TAG_TAP_TWEAK, &data),
            TapTweakHash::from_key_and_tweak(key, Some(root)).to_byte_array()
        );
    }
}
