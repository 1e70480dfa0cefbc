//! P2TR outputs with an optional MuSig2 key path and a script tree.
//!
//! Everything is computed once in [`P2trPayment::new`]; the value is
//! immutable afterwards.

use bitcoin::key::{Parity, TweakedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::TapNodeHash;
use bitcoin::{Address, Network, Script, ScriptBuf, Witness};

use crate::control_block::{serialize_control_block, ControlBlock, ANNEX_TAG};
use crate::error::{Result, TaprootError};
use crate::hash::TAPSCRIPT_LEAF_VERSION;
use crate::keyagg::{aggregate_musig_pubkeys, aggregate_xonly_musig_pubkeys};
use crate::taptree::{depth_first_taptree, huffman_taptree_with_versions, TapLeaf, Taptree};
use crate::tweak::{tap_tweak_pubkey, TweakedPubkey};
use crate::witness::is_canonical_schnorr_signature;

/// BIP-341 "H" point: `lift_x(SHA256(G))`, no known discrete log.
pub const NUMS_INTERNAL_KEY: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// Keys able to spend through the key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPathKeys {
    /// Script path only; the internal key is [`NUMS_INTERNAL_KEY`].
    None,
    /// One key, or several aggregated with the x-only MuSig2* variant.
    XOnly(Vec<XOnlyPublicKey>),
    /// One key, or several aggregated with BIP-327 over the sorted list.
    Plain(Vec<PublicKey>),
}

/// A leaf script plus how it is placed in the tree.
///
/// Either every redeem of a payment carries a depth (depth-first tree) or
/// none does (weighted tree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapRedeem {
    pub script: ScriptBuf,
    pub leaf_version: u8,
    pub depth: Option<u8>,
    pub weight: Option<u32>,
}

impl TapRedeem {
    pub fn with_depth(script: ScriptBuf, depth: u8) -> Self {
        TapRedeem {
            script,
            leaf_version: TAPSCRIPT_LEAF_VERSION,
            depth: Some(depth),
            weight: None,
        }
    }

    pub fn with_weight(script: ScriptBuf, weight: u32) -> Self {
        TapRedeem {
            script,
            leaf_version: TAPSCRIPT_LEAF_VERSION,
            depth: None,
            weight: Some(weight),
        }
    }
}

#[derive(Debug, Clone)]
pub struct P2trPayment {
    internal_pubkey: XOnlyPublicKey,
    has_key_path: bool,
    redeems: Vec<TapRedeem>,
    taptree: Option<Taptree>,
    tweaked: TweakedPubkey,
}

impl P2trPayment {
    pub fn new(keys: KeyPathKeys, redeems: Vec<TapRedeem>) -> Result<Self> {
        let (internal_pubkey, has_key_path) = match &keys {
            KeyPathKeys::None => (nums_internal_key()?, false),
            KeyPathKeys::XOnly(k) if k.is_empty() => (nums_internal_key()?, false),
            KeyPathKeys::Plain(k) if k.is_empty() => (nums_internal_key()?, false),
            KeyPathKeys::XOnly(k) if k.len() == 1 => (k[0], true),
            KeyPathKeys::Plain(k) if k.len() == 1 => (k[0].x_only_public_key().0, true),
            KeyPathKeys::XOnly(k) => (aggregate_xonly_musig_pubkeys(k)?, true),
            KeyPathKeys::Plain(k) => (aggregate_musig_pubkeys(k)?, true),
        };
        if !has_key_path && redeems.is_empty() {
            return Err(TaprootError::InvalidArgument(
                "refusing to build an unspendable output: no key path and no redeems".to_string(),
            ));
        }

        let taptree = build_taptree(&redeems)?;
        let tweaked = tap_tweak_pubkey(&internal_pubkey, taptree.as_ref().map(|t| &t.root))?;
        log::debug!(
            "p2tr output {} ({} redeems, key path: {})",
            tweaked.output_key,
            redeems.len(),
            has_key_path
        );

        Ok(P2trPayment {
            internal_pubkey,
            has_key_path,
            redeems,
            taptree,
            tweaked,
        })
    }

    pub fn internal_pubkey(&self) -> XOnlyPublicKey {
        self.internal_pubkey
    }

    pub fn output_key(&self) -> XOnlyPublicKey {
        self.tweaked.output_key
    }

    pub fn parity(&self) -> Parity {
        self.tweaked.parity
    }

    pub fn merkle_root(&self) -> Option<TapNodeHash> {
        self.taptree.as_ref().map(|t| t.root)
    }

    pub fn taptree(&self) -> Option<&Taptree> {
        self.taptree.as_ref()
    }

    /// `OP_1 <output key>`
    pub fn output_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(
            self.tweaked.output_key,
        ))
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(
            TweakedPublicKey::dangerous_assume_tweaked(self.tweaked.output_key),
            network,
        )
    }

    pub fn control_block(&self, redeem_index: usize) -> Result<ControlBlock> {
        let (redeem, path) = self.redeem_and_path(redeem_index)?;
        ControlBlock::parse(&serialize_control_block(
            self.tweaked.parity,
            &self.internal_pubkey,
            path,
            redeem.leaf_version,
        ))
    }

    /// `[...stack, script, control block, annex?]`
    pub fn script_path_witness(
        &self,
        redeem_index: usize,
        stack: Vec<Vec<u8>>,
        annex: Option<Vec<u8>>,
    ) -> Result<Witness> {
        let (redeem, _) = self.redeem_and_path(redeem_index)?;
        let control_block = self.control_block(redeem_index)?;

        let mut witness = Witness::new();
        for element in stack {
            witness.push(element);
        }
        witness.push(redeem.script.as_bytes());
        witness.push(control_block.serialize());
        if let Some(annex) = annex {
            check_annex(&annex)?;
            witness.push(annex);
        }
        Ok(witness)
    }

    pub fn key_path_witness(&self, signature: &[u8], annex: Option<Vec<u8>>) -> Result<Witness> {
        if !self.has_key_path {
            return Err(TaprootError::InvalidArgument(
                "output has no key path".to_string(),
            ));
        }
        if !is_canonical_schnorr_signature(signature) {
            return Err(TaprootError::InvalidWitness(format!(
                "not a canonical schnorr signature ({} bytes)",
                signature.len()
            )));
        }
        let mut witness = Witness::new();
        witness.push(signature);
        if let Some(annex) = annex {
            check_annex(&annex)?;
            witness.push(annex);
        }
        Ok(witness)
    }

    fn redeem_and_path(&self, redeem_index: usize) -> Result<(&TapRedeem, &[TapNodeHash])> {
        let redeem = self.redeems.get(redeem_index).ok_or_else(|| {
            TaprootError::InvalidArgument(format!(
                "redeem index {} out of range ({} redeems)",
                redeem_index,
                self.redeems.len()
            ))
        })?;
        let path = self
            .taptree
            .as_ref()
            .and_then(|t| t.paths.get(redeem_index))
            .ok_or_else(|| {
                TaprootError::InvalidTaptree(format!("no path for redeem {}", redeem_index))
            })?;
        Ok((redeem, path.as_slice()))
    }
}

fn nums_internal_key() -> Result<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(&NUMS_INTERNAL_KEY)
        .map_err(|e| TaprootError::InvalidPubkey(format!("NUMS point: {}", e)))
}

fn check_annex(annex: &[u8]) -> Result<()> {
    if annex.first() != Some(&ANNEX_TAG) {
        return Err(TaprootError::InvalidWitness(
            "annex must start with 0x50".to_string(),
        ));
    }
    Ok(())
}

fn build_taptree(redeems: &[TapRedeem]) -> Result<Option<Taptree>> {
    if redeems.is_empty() {
        return Ok(None);
    }
    let with_depth = redeems.iter().filter(|r| r.depth.is_some()).count();
    if with_depth == redeems.len() {
        let leaves: Vec<TapLeaf> = redeems
            .iter()
            .map(|r| TapLeaf {
                script: r.script.clone(),
                leaf_version: r.leaf_version,
                depth: r.depth,
            })
            .collect();
        return depth_first_taptree(&leaves).map(Some);
    }
    if with_depth != 0 {
        return Err(TaprootError::InvalidTaptree(format!(
            "{} of {} redeems have a depth; use depths for all or none",
            with_depth,
            redeems.len()
        )));
    }
    let leaves: Vec<(&Script, u8)> = redeems
        .iter()
        .map(|r| (r.script.as_script(), r.leaf_version))
        .collect();
    let weights: Vec<Option<u32>> = redeems.iter().map(|r| r.weight).collect();
    huffman_taptree_with_versions(&leaves, &weights).map(Some)
}

/// Witness program of a 34-byte `OP_1 <32 bytes>` output script.
pub fn tweaked_output_key(script_pubkey: &Script) -> Result<XOnlyPublicKey> {
    if !script_pubkey.is_p2tr() {
        return Err(TaprootError::InvalidOutputScript(format!(
            "not a P2TR output: {}",
            script_pubkey.to_hex_string()
        )));
    }
    XOnlyPublicKey::from_slice(&script_pubkey.as_bytes()[2..])
        .map_err(|e| TaprootError::InvalidOutputScript(format!("witness program: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tapscript::build_n_of_n_tapscript;
    use crate::witness::{parse_witness, ParsedWitness};
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::taproot::{LeafVersion, TaprootBuilder};

    fn test_pubkey(seed_byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let mut secret_bytes = [0u8; 32];
        secret_bytes[31] = seed_byte;
        secret_bytes[0] = 0x01;
        SecretKey::from_slice(&secret_bytes)
            .unwrap()
            .public_key(&secp)
    }

    fn xonly(seed_byte: u8) -> XOnlyPublicKey {
        test_pubkey(seed_byte).x_only_public_key().0
    }

    fn two_of_two(a: u8, b: u8) -> ScriptBuf {
        build_n_of_n_tapscript(&[xonly(a), xonly(b)]).unwrap()
    }

    #[test]
    fn test_musig_key_path_with_depth_tree() {
        let payment = P2trPayment::new(
            KeyPathKeys::Plain(vec![test_pubkey(2), test_pubkey(1)]),
            vec![
                TapRedeem::with_depth(two_of_two(1, 3), 1),
                TapRedeem::with_depth(two_of_two(2, 3), 1),
            ],
        )
        .unwrap();

        assert_eq!(
            payment.internal_pubkey(),
            aggregate_musig_pubkeys(&[test_pubkey(1), test_pubkey(2)]).unwrap()
        );

        let secp = Secp256k1::new();
        let spend_info = TaprootBuilder::new()
            .add_leaf(1, two_of_two(1, 3))
            .unwrap()
            .add_leaf(1, two_of_two(2, 3))
            .unwrap()
            .finalize(&secp, payment.internal_pubkey())
            .unwrap();
        assert_eq!(payment.output_key(), spend_info.output_key().to_inner());
        assert_eq!(payment.parity(), spend_info.output_key_parity());
        assert_eq!(
            payment.output_script(),
            ScriptBuf::new_p2tr(&secp, payment.internal_pubkey(), spend_info.merkle_root())
        );

        let cb = payment.control_block(1).unwrap();
        let theirs = spend_info
            .control_block(&(two_of_two(2, 3), LeafVersion::TapScript))
            .unwrap();
        assert_eq!(cb.serialize(), theirs.serialize());
        assert!(cb
            .verify_taproot_commitment(&payment.output_key(), &two_of_two(2, 3))
            .unwrap());
    }

    #[test]
    fn test_single_key_without_tree() {
        let payment = P2trPayment::new(KeyPathKeys::XOnly(vec![xonly(1)]), vec![]).unwrap();
        assert_eq!(payment.internal_pubkey(), xonly(1));
        assert_eq!(payment.merkle_root(), None);
        assert!(payment.control_block(0).is_err());

        let witness = payment.key_path_witness(&[0x01; 64], None).unwrap();
        assert!(parse_witness(&witness).unwrap().is_key_path());
    }

    #[test]
    fn test_script_only_uses_nums_key() {
        let payment =
            P2trPayment::new(KeyPathKeys::None, vec![TapRedeem::with_weight(two_of_two(1, 2), 1)])
                .unwrap();
        assert_eq!(payment.internal_pubkey().serialize(), NUMS_INTERNAL_KEY);
        assert!(payment.key_path_witness(&[0x01; 64], None).is_err());
    }

    #[test]
    fn test_refuses_unspendable_output() {
        assert!(P2trPayment::new(KeyPathKeys::None, vec![]).is_err());
        assert!(P2trPayment::new(KeyPathKeys::Plain(vec![]), vec![]).is_err());
    }

    #[test]
    fn test_mixed_depth_and_weight_is_rejected() {
        let result = P2trPayment::new(
            KeyPathKeys::XOnly(vec![xonly(1)]),
            vec![
                TapRedeem::with_depth(two_of_two(1, 2), 1),
                TapRedeem::with_weight(two_of_two(1, 3), 5),
            ],
        );
        assert!(matches!(result, Err(TaprootError::InvalidTaptree(_))));
    }

    #[test]
    fn test_weighted_matches_depths() {
        let scripts = [two_of_two(1, 2), two_of_two(1, 3), two_of_two(2, 3)];
        let weighted = P2trPayment::new(
            KeyPathKeys::XOnly(vec![xonly(1), xonly(2)]),
            vec![
                TapRedeem::with_weight(scripts[0].clone(), 5),
                TapRedeem::with_weight(scripts[1].clone(), 1),
                TapRedeem::with_weight(scripts[2].clone(), 1),
            ],
        )
        .unwrap();
        let depths = P2trPayment::new(
            KeyPathKeys::XOnly(vec![xonly(1), xonly(2)]),
            vec![
                TapRedeem::with_depth(scripts[0].clone(), 1),
                TapRedeem::with_depth(scripts[1].clone(), 2),
                TapRedeem::with_depth(scripts[2].clone(), 2),
            ],
        )
        .unwrap();
        assert_eq!(weighted.merkle_root(), depths.merkle_root());
        assert_eq!(weighted.output_key(), depths.output_key());
    }

    #[test]
    fn test_script_path_witness_layout() {
        let payment = P2trPayment::new(
            KeyPathKeys::None,
            vec![
                TapRedeem::with_depth(two_of_two(1, 2), 1),
                TapRedeem::with_depth(two_of_two(1, 3), 1),
            ],
        )
        .unwrap();
        let witness = payment
            .script_path_witness(0, vec![vec![0x02; 64], vec![0x01; 64]], Some(vec![0x50, 0x01]))
            .unwrap();
        assert_eq!(witness.len(), 5);

        match parse_witness(&witness).unwrap() {
            ParsedWitness::ScriptPath {
                script_sig,
                tapscript,
                control_block,
                annex,
            } => {
                assert_eq!(script_sig.len(), 2);
                assert_eq!(tapscript, two_of_two(1, 2));
                assert_eq!(control_block, payment.control_block(0).unwrap());
                assert_eq!(annex, Some(vec![0x50, 0x01]));
            }
            other => panic!("expected script path, got {:?}", other),
        }

        assert!(payment
            .script_path_witness(0, vec![], Some(vec![0x51]))
            .is_err());
        assert!(payment.script_path_witness(2, vec![], None).is_err());
    }

    #[test]
    fn test_tweaked_output_key() {
        let payment = P2trPayment::new(KeyPathKeys::XOnly(vec![xonly(1)]), vec![]).unwrap();
        assert_eq!(
            tweaked_output_key(&payment.output_script()).unwrap(),
            payment.output_key()
        );
        assert!(tweaked_output_key(&ScriptBuf::from_bytes(vec![0x51, 0x20])).is_err());
        assert!(payment.address(Network::Bitcoin).to_string().starts_with("bc1p"));
    }
}
