//! # tapsig-psbt
//!
//! PSBT handling for 2-of-3 taproot wallets built on `tapsig-core`.
//!
//! Script-path inputs are signed with schnorr over a single leaf and
//! finalized with the signatures in reverse key order, as an n-of-n
//! `CHECKSIGVERIFY ... CHECKSIG` leaf consumes them. Key-path inputs are
//! MuSig2: this crate records the participants and each signer's public
//! nonce as proprietary key-values (`0xFC`, identifier `BITGO`).

pub mod config;
pub mod error;
pub mod musig;
pub mod proprietary;
pub mod psbt;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::PsbtConfig;
pub use error::{PsbtError, Result};
pub use musig::{
    decode_psbt_musig2_participants, decode_psbt_musig2_pub_nonce,
    encode_psbt_musig2_participants, encode_psbt_musig2_pub_nonce,
    generate_musig2_nonce_for_input, set_musig2_nonces, verified_musig2_participants,
    Musig2Participants, Musig2PubNonce, RootWalletKey,
};
pub use proprietary::{
    decode_proprietary_key, encode_proprietary_key, ProprietaryKeyData, ProprietaryKeySearch,
    ProprietaryKeySubtype, ProprietaryKeyValue, PSBT_PROPRIETARY_IDENTIFIER,
};
pub use psbt::TaprootPsbt;
