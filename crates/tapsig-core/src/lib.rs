//! # tapsig-core
//!
//! Taproot (BIP-340/341/342) building blocks for multi-party wallets:
//!
//! - BIP-340 tagged hashes and BIP-341 leaf/branch hashing
//! - MuSig2 (BIP-327) public key aggregation for the key path
//! - Taptree construction, depth-first (BIP-371) or weighted (Huffman)
//! - Key tweaking, control blocks and witness classification
//! - The n-of-n checksig tapscript and a P2TR payment builder
//!
//! Everything here is a pure function over keys and bytes. PSBT handling
//! lives in `tapsig-psbt`.

pub mod control_block;
pub mod error;
pub mod hash;
pub mod keyagg;
pub mod payment;
pub mod tapscript;
pub mod taptree;
pub mod tweak;
pub mod witness;

pub use control_block::{serialize_control_block, ControlBlock};
pub use error::{ErrorKind, TaprootError};
pub use hash::{hash_tap_branch, hash_tap_leaf, tagged_hash, TAPSCRIPT_LEAF_VERSION};
pub use keyagg::{aggregate_musig_pubkeys, aggregate_xonly_musig_pubkeys, key_agg_context};
pub use payment::{tweaked_output_key, KeyPathKeys, P2trPayment, TapRedeem};
pub use tapscript::{build_n_of_n_tapscript, parse_n_of_n_tapscript};
pub use taptree::{depth_first_taptree, huffman_taptree, TapLeaf, Taptree};
pub use tweak::{
    create_tap_internal_key, create_tap_output_key, tap_tweak_privkey, tap_tweak_pubkey,
    TweakedPubkey,
};
pub use witness::{parse_taproot_witness, parse_witness, ParsedWitness};
