//! BIP-341 key tweaking.
//!
//! The output key commits to the internal key and the taptree root:
//! `Q = P + H_TapTweak(P || root) * G`. Without a script tree the tweak is
//! `H_TapTweak(P)`, which commits to an unspendable script path.

use bitcoin::hashes::Hash;
use bitcoin::key::{Parity, XOnlyPublicKey};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use bitcoin::taproot::TapNodeHash;

use crate::error::{Result, TaprootError};
use crate::hash::{tagged_hash, TAG_TAP_TWEAK};
use crate::keyagg::aggregate_musig_pubkeys;

/// A tweaked output key together with the parity of its full point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweakedPubkey {
    pub output_key: XOnlyPublicKey,
    pub parity: Parity,
}

/// `H_TapTweak(internal || root)` or `H_TapTweak(internal)`.
pub fn tap_tweak_hash(internal_pubkey: &XOnlyPublicKey, root: Option<&TapNodeHash>) -> [u8; 32] {
    let mut data = internal_pubkey.serialize().to_vec();
    if let Some(root) = root {
        data.extend_from_slice(root.as_byte_array());
    }
    tagged_hash(TAG_TAP_TWEAK, &data)
}

fn tweak_scalar(internal_pubkey: &XOnlyPublicKey, root: Option<&TapNodeHash>) -> Result<Scalar> {
    Scalar::from_be_bytes(tap_tweak_hash(internal_pubkey, root))
        .map_err(|e| TaprootError::InvalidPubkey(format!("tweak out of range: {}", e)))
}

pub fn tap_tweak_pubkey(
    internal_pubkey: &XOnlyPublicKey,
    root: Option<&TapNodeHash>,
) -> Result<TweakedPubkey> {
    let secp = Secp256k1::verification_only();
    let tweak = tweak_scalar(internal_pubkey, root)?;
    let (output_key, parity) = internal_pubkey
        .add_tweak(&secp, &tweak)
        .map_err(|e| TaprootError::InvalidPubkey(format!("tweak addition: {}", e)))?;
    Ok(TweakedPubkey { output_key, parity })
}

/// Tweak a secret key so it signs for the output key of its own x-only
/// public key. Odd-Y keys are negated first.
pub fn tap_tweak_privkey(privkey: &SecretKey, root: Option<&TapNodeHash>) -> Result<SecretKey> {
    let secp = Secp256k1::signing_only();
    let (internal_pubkey, parity) = privkey.x_only_public_key(&secp);
    let privkey = match parity {
        Parity::Odd => privkey.negate(),
        Parity::Even => *privkey,
    };
    let tweak = Scalar::from_be_bytes(tap_tweak_hash(&internal_pubkey, root))
        .map_err(|e| TaprootError::InvalidPrivkey(format!("tweak out of range: {}", e)))?;
    privkey
        .add_tweak(&tweak)
        .map_err(|e| TaprootError::InvalidPrivkey(format!("tweak addition: {}", e)))
}

/// Internal key of a MuSig2 key-path: the aggregate of the participant keys.
pub fn create_tap_internal_key(pubkeys: &[PublicKey]) -> Result<XOnlyPublicKey> {
    aggregate_musig_pubkeys(pubkeys)
}

/// Output key for an internal key and a 32-byte taptree root.
pub fn create_tap_output_key(internal_pubkey: &XOnlyPublicKey, root: &[u8]) -> Result<XOnlyPublicKey> {
    let root: [u8; 32] = root.try_into().map_err(|_| {
        TaprootError::InvalidArgument(format!("taptree root must be 32 bytes, got {}", root.len()))
    })?;
    let root = TapNodeHash::from_byte_array(root);
    Ok(tap_tweak_pubkey(internal_pubkey, Some(&root))?.output_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::key::TapTweak;

    fn test_keypair(seed_byte: u8) -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let mut secret_bytes = [0u8; 32];
        secret_bytes[31] = seed_byte;
        secret_bytes[0] = 0x01;
        let sk = SecretKey::from_slice(&secret_bytes).unwrap();
        let pk = sk.public_key(&secp);
        (sk, pk)
    }

    fn agg12() -> XOnlyPublicKey {
        create_tap_internal_key(&[test_keypair(1).1, test_keypair(2).1]).unwrap()
    }

    fn root(byte: u8) -> TapNodeHash {
        TapNodeHash::from_byte_array([byte; 32])
    }

    #[test]
    fn test_tweak_pinned_vectors() {
        let internal = agg12();
        let cases = [
            (Some(root(0xab)), "320a795a0e69231dd3be2f8bf17a76d66e242179e680cce9fc441803e61233ba", Parity::Even),
            (None, "c336c48bfb3e0fff3d6d0f50422a72e47c838780bc97f95e50f6a2da675da72b", Parity::Even),
            (Some(root(0x03)), "00af769b4056c70bf398f6d0dcbffdcb5ff12be038e2bd0ace96ec70d7413bc6", Parity::Odd),
            (Some(root(0x06)), "193cc27aacfa86e4323b2847a6fd825169a9a33a38b9adac31268d2d9b521599", Parity::Odd),
        ];
        for (root, expected_key, expected_parity) in cases {
            let tweaked = tap_tweak_pubkey(&internal, root.as_ref()).unwrap();
            assert_eq!(hex::encode(tweaked.output_key.serialize()), expected_key);
            assert_eq!(tweaked.parity, expected_parity);
        }
    }

    #[test]
    fn test_tweak_matches_rust_bitcoin() {
        let secp = Secp256k1::new();
        let internal = agg12();
        for r in [None, Some(root(0x01)), Some(root(0x03))] {
            let ours = tap_tweak_pubkey(&internal, r.as_ref()).unwrap();
            let (theirs, parity) = internal.tap_tweak(&secp, r);
            assert_eq!(ours.output_key, theirs.to_inner());
            assert_eq!(ours.parity, parity);
        }
    }

    #[test]
    fn test_tweak_is_deterministic() {
        let internal = agg12();
        let a = tap_tweak_pubkey(&internal, Some(&root(0x42))).unwrap();
        let b = tap_tweak_pubkey(&internal, Some(&root(0x42))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tweak_privkey_matches_pubkey() {
        let secp = Secp256k1::new();
        for seed in 1..=6u8 {
            let (sk, pk) = test_keypair(seed);
            let internal = pk.x_only_public_key().0;
            for r in [None, Some(root(0xab))] {
                let tweaked_sk = tap_tweak_privkey(&sk, r.as_ref()).unwrap();
                let expected = tap_tweak_pubkey(&internal, r.as_ref()).unwrap();
                let (xonly, parity) = tweaked_sk.x_only_public_key(&secp);
                assert_eq!(xonly, expected.output_key);
                assert_eq!(parity, expected.parity);
            }
        }
    }

    #[test]
    fn test_create_tap_output_key() {
        let internal = agg12();
        let out = create_tap_output_key(&internal, &[0x01; 32]).unwrap();
        assert_eq!(
            hex::encode(out.serialize()),
            "db954bff0711fb7d75cbee89187cc1c973fca77aa56f68730608de0cae040c0d"
        );
    }

    #[test]
    fn test_create_tap_output_key_rejects_bad_root_length() {
        let internal = agg12();
        let err = create_tap_output_key(&internal, &[0x01; 31]).unwrap_err();
        assert!(matches!(err, TaprootError::InvalidArgument(_)));
        assert!(create_tap_output_key(&internal, &[]).is_err());
    }
}
