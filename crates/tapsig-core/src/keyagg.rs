//! MuSig2 (BIP-327) public key aggregation.
//!
//! Keys are sorted by their serialized bytes before aggregation, so the
//! aggregate is independent of the order participants are listed in.
//!
//! ```text
//! L      = H_KeyAgg_list(pk_1 || ... || pk_n)
//! a_i    = 1                                  if pk_i == second distinct key
//!        = H_KeyAgg_coefficient(L || pk_i)    otherwise
//! Q      = sum(a_i * P_i)
//! ```

use bitcoin::key::{Parity, XOnlyPublicKey};
use bitcoin::secp256k1::PublicKey;
use musig2::KeyAggContext;

use crate::error::{Result, TaprootError};

/// Aggregate 33-byte compressed keys with their own parity (BIP-327 KeyAgg
/// over the sorted list).
pub fn aggregate_musig_pubkeys(pubkeys: &[PublicKey]) -> Result<XOnlyPublicKey> {
    aggregate_sorted(pubkeys.to_vec())
}

/// Aggregate x-only keys, lifting each one to even Y (`0x02 || x`).
pub fn aggregate_xonly_musig_pubkeys(pubkeys: &[XOnlyPublicKey]) -> Result<XOnlyPublicKey> {
    aggregate_sorted(
        pubkeys
            .iter()
            .map(|xonly| PublicKey::from_x_only_public_key(*xonly, Parity::Even))
            .collect(),
    )
}

/// Build the [`KeyAggContext`] for `pubkeys` in sorted order.
pub fn key_agg_context(pubkeys: &[PublicKey]) -> Result<KeyAggContext> {
    if pubkeys.len() < 2 {
        return Err(TaprootError::InvalidArgument(format!(
            "at least two pubkeys are required for aggregation, got {}",
            pubkeys.len()
        )));
    }
    let mut sorted: Vec<[u8; 33]> = pubkeys.iter().map(|pk| pk.serialize()).collect();
    sorted.sort();

    let musig_keys = sorted
        .iter()
        .map(|bytes| pubkey_to_musig(bytes))
        .collect::<Result<Vec<_>>>()?;
    KeyAggContext::new(musig_keys)
        .map_err(|e| TaprootError::AggregationError(format!("key aggregation: {}", e)))
}

fn aggregate_sorted(pubkeys: Vec<PublicKey>) -> Result<XOnlyPublicKey> {
    let ctx = key_agg_context(&pubkeys)?;
    let agg: musig2::secp256k1::PublicKey = ctx.aggregated_pubkey();
    let (xonly, _parity) = agg.x_only_public_key();
    XOnlyPublicKey::from_slice(&xonly.serialize())
        .map_err(|e| TaprootError::AggregationError(format!("xonly conversion: {}", e)))
}

fn pubkey_to_musig(bytes: &[u8; 33]) -> Result<musig2::secp256k1::PublicKey> {
    musig2::secp256k1::PublicKey::from_slice(bytes)
        .map_err(|e| TaprootError::InvalidPubkey(format!("musig2 conversion: {}", e)))
}
