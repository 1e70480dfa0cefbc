//! MuSig2 key-path records and nonce generation for PSBT inputs.
//!
//! Two proprietary records ride along on a MuSig2 input:
//!
//! ```text
//! participants  keydata = tapOutputKey(32) || tapInternalKey(32)
//!               value   = participantPubKey(33) || participantPubKey(33)
//! pub nonce     keydata = participantPubKey(33) || tapOutputKey(32)
//!               value   = pubNonce(66)
//! ```
//!
//! Bridges to the musig2 crate's secp256k1 types via byte serialization.

use bitcoin::bip32::{DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::hashes::Hash;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::psbt::Input;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use musig2::SecNonce;
use tapsig_core::{create_tap_internal_key, create_tap_output_key};

use crate::error::{PsbtError, Result};
use crate::proprietary::{
    ProprietaryKeyData, ProprietaryKeySearch, ProprietaryKeySubtype, ProprietaryKeyValue,
    PSBT_PROPRIETARY_IDENTIFIER,
};
use crate::psbt::TaprootPsbt;

pub const PUB_NONCE_SIZE: usize = 66;
pub const SESSION_ID_SIZE: usize = 32;

// ─── Records ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Musig2Participants {
    pub tap_output_key: XOnlyPublicKey,
    pub tap_internal_key: XOnlyPublicKey,
    pub participant_pub_keys: [PublicKey; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Musig2PubNonce {
    pub participant_pub_key: PublicKey,
    pub tap_output_key: XOnlyPublicKey,
    pub pub_nonce: Vec<u8>,
}

pub fn encode_psbt_musig2_participants(participants: &Musig2Participants) -> ProprietaryKeyValue {
    let mut keydata = participants.tap_output_key.serialize().to_vec();
    keydata.extend_from_slice(&participants.tap_internal_key.serialize());
    let mut value = participants.participant_pub_keys[0].serialize().to_vec();
    value.extend_from_slice(&participants.participant_pub_keys[1].serialize());
    ProprietaryKeyValue {
        key: ProprietaryKeyData {
            identifier: PSBT_PROPRIETARY_IDENTIFIER.to_string(),
            subtype: ProprietaryKeySubtype::Musig2ParticipantPubKeys as u8,
            keydata,
        },
        value,
    }
}

pub fn encode_psbt_musig2_pub_nonce(nonce: &Musig2PubNonce) -> Result<ProprietaryKeyValue> {
    if nonce.pub_nonce.len() != PUB_NONCE_SIZE {
        return Err(PsbtError::InvalidProprietaryValue(format!(
            "pub nonce must be {} bytes, got {}",
            PUB_NONCE_SIZE,
            nonce.pub_nonce.len()
        )));
    }
    let mut keydata = nonce.participant_pub_key.serialize().to_vec();
    keydata.extend_from_slice(&nonce.tap_output_key.serialize());
    Ok(ProprietaryKeyValue {
        key: ProprietaryKeyData {
            identifier: PSBT_PROPRIETARY_IDENTIFIER.to_string(),
            subtype: ProprietaryKeySubtype::Musig2PubNonce as u8,
            keydata,
        },
        value: nonce.pub_nonce.clone(),
    })
}

fn check_record_key(kv: &ProprietaryKeyValue, subtype: ProprietaryKeySubtype) -> Result<()> {
    if kv.key.identifier != PSBT_PROPRIETARY_IDENTIFIER {
        return Err(PsbtError::InvalidProprietaryKey(format!(
            "invalid identifier {}",
            kv.key.identifier
        )));
    }
    if kv.key.subtype != subtype as u8 {
        return Err(PsbtError::InvalidProprietaryKey(format!(
            "invalid subtype 0x{:02x}, expected 0x{:02x}",
            kv.key.subtype, subtype as u8
        )));
    }
    Ok(())
}

fn check_len(what: &str, bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(PsbtError::InvalidProprietaryValue(format!(
            "invalid {} size {}, expected {}",
            what,
            bytes.len(),
            expected
        )));
    }
    Ok(())
}

fn parse_xonly(what: &str, bytes: &[u8]) -> Result<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(bytes)
        .map_err(|e| PsbtError::InvalidProprietaryValue(format!("{}: {}", what, e)))
}

fn parse_pubkey(what: &str, bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_slice(bytes)
        .map_err(|e| PsbtError::InvalidProprietaryValue(format!("{}: {}", what, e)))
}

pub fn decode_psbt_musig2_participants(kv: &ProprietaryKeyValue) -> Result<Musig2Participants> {
    check_record_key(kv, ProprietaryKeySubtype::Musig2ParticipantPubKeys)?;
    check_len("participants keydata", &kv.key.keydata, 64)?;
    check_len("participants value", &kv.value, 66)?;

    let (first, second) = kv.value.split_at(33);
    if first == second {
        return Err(PsbtError::DuplicateParticipant);
    }

    Ok(Musig2Participants {
        tap_output_key: parse_xonly("tapOutputKey", &kv.key.keydata[..32])?,
        tap_internal_key: parse_xonly("tapInternalKey", &kv.key.keydata[32..])?,
        participant_pub_keys: [
            parse_pubkey("participant pub key", first)?,
            parse_pubkey("participant pub key", second)?,
        ],
    })
}

pub fn decode_psbt_musig2_pub_nonce(kv: &ProprietaryKeyValue) -> Result<Musig2PubNonce> {
    check_record_key(kv, ProprietaryKeySubtype::Musig2PubNonce)?;
    check_len("nonce keydata", &kv.key.keydata, 65)?;
    check_len("pub nonce", &kv.value, PUB_NONCE_SIZE)?;

    Ok(Musig2PubNonce {
        participant_pub_key: parse_pubkey("participant pub key", &kv.key.keydata[..33])?,
        tap_output_key: parse_xonly("tapOutputKey", &kv.key.keydata[33..])?,
        pub_nonce: kv.value.clone(),
    })
}

// ─── Wallet keys ────────────────────────────────────────────────────────────

/// Root of a signer's BIP-32 tree. Nonce generation needs the private form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootWalletKey {
    Private(Xpriv),
    Public(Xpub),
}

impl RootWalletKey {
    pub fn is_neutered(&self) -> bool {
        matches!(self, RootWalletKey::Public(_))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            RootWalletKey::Private(xpriv) => xpriv.fingerprint(&Secp256k1::new()),
            RootWalletKey::Public(xpub) => xpub.fingerprint(),
        }
    }

    pub fn derive_public_key(&self, path: &DerivationPath) -> Result<PublicKey> {
        let secp = Secp256k1::new();
        match self {
            RootWalletKey::Private(_) => Ok(self.derive_secret_key(path)?.public_key(&secp)),
            RootWalletKey::Public(xpub) => xpub
                .derive_pub(&secp, path)
                .map(|child| child.public_key)
                .map_err(|e| PsbtError::Derivation(e.to_string())),
        }
    }

    pub fn derive_secret_key(&self, path: &DerivationPath) -> Result<SecretKey> {
        match self {
            RootWalletKey::Private(xpriv) => xpriv
                .derive_priv(&Secp256k1::new(), path)
                .map(|child| child.private_key)
                .map_err(|e| PsbtError::Derivation(e.to_string())),
            RootWalletKey::Public(_) => Err(PsbtError::NeuteredKey),
        }
    }
}

// ─── Type conversion helpers ────────────────────────────────────────────────

fn xonly_to_musig(xonly: &XOnlyPublicKey) -> Result<musig2::secp256k1::PublicKey> {
    let mut bytes = [0x02u8; 33];
    bytes[1..].copy_from_slice(&xonly.serialize());
    musig2::secp256k1::PublicKey::from_slice(&bytes)
        .map_err(|e| PsbtError::Nonce(format!("xonly conversion: {}", e)))
}

fn seckey_to_musig(sk: &SecretKey) -> Result<musig2::secp256k1::SecretKey> {
    #[allow(deprecated)]
    musig2::secp256k1::SecretKey::from_slice(&sk.secret_bytes())
        .map_err(|e| PsbtError::Nonce(format!("seckey conversion: {}", e)))
}

// ─── Nonce Generation ───────────────────────────────────────────────────────

fn check_session_id(session_id: Option<&[u8]>) -> Result<()> {
    match session_id {
        Some(id) if id.len() != SESSION_ID_SIZE => Err(PsbtError::InvalidSessionId(id.len())),
        _ => Ok(()),
    }
}

/// The single tap key origin that the root key derives, with its child key.
fn derive_participant_key(
    input: &Input,
    index: usize,
    root: &RootWalletKey,
) -> Result<(SecretKey, PublicKey)> {
    let fingerprint = root.fingerprint();
    let mut matches = Vec::new();
    for (xonly, (_, (fp, path))) in &input.tap_key_origins {
        if *fp != fingerprint {
            continue;
        }
        let pubkey = root.derive_public_key(path)?;
        if pubkey.x_only_public_key().0 == *xonly {
            matches.push(path.clone());
        }
    }
    let path = match matches.as_slice() {
        [] => return Err(PsbtError::NoMatchingDerivation(index)),
        [path] => path,
        _ => {
            return Err(PsbtError::AmbiguousDerivation {
                index,
                count: matches.len(),
            })
        }
    };
    let seckey = root.derive_secret_key(path)?;
    Ok((seckey, seckey.public_key(&Secp256k1::new())))
}

/// Participants record of an input, checked against its key path.
///
/// The aggregate of the participant keys must equal the recorded internal
/// key and the input's `tap_internal_key`, and tweaking it by the input's
/// merkle root must give the recorded output key.
pub fn verified_musig2_participants(psbt: &TaprootPsbt, index: usize) -> Result<Musig2Participants> {
    let input = psbt.input(index)?;
    let input_internal_key = input.tap_internal_key.ok_or(PsbtError::MissingField {
        index,
        field: "tapInternalKey",
    })?;
    let merkle_root = input.tap_merkle_root.ok_or(PsbtError::MissingField {
        index,
        field: "tapMerkleRoot",
    })?;

    let search = ProprietaryKeySearch::new(ProprietaryKeySubtype::Musig2ParticipantPubKeys);
    let records = psbt.get_proprietary_key_vals(index, Some(&search))?;
    if records.len() != 1 {
        return Err(PsbtError::ParticipantRecordCount {
            index,
            count: records.len(),
        });
    }
    let participants = decode_psbt_musig2_participants(&records[0])?;

    let internal_key = create_tap_internal_key(&participants.participant_pub_keys)?;
    if internal_key != participants.tap_internal_key {
        return Err(PsbtError::InternalKeyMismatch);
    }
    let output_key = create_tap_output_key(&internal_key, merkle_root.as_byte_array())?;
    if output_key != participants.tap_output_key {
        return Err(PsbtError::OutputKeyMismatch);
    }
    if internal_key != input_internal_key {
        return Err(PsbtError::InputInternalKeyMismatch);
    }
    Ok(participants)
}

/// Generate this signer's MuSig2 nonce for one input.
///
/// Returns `None` for inputs without a `tap_internal_key`. The secret nonce
/// is bound to the derived participant key, the tweaked output key, the
/// key-path sighash and the participant's compressed pubkey. With a session
/// id the nonce is deterministic; otherwise it is seeded from the OS RNG.
///
/// CRITICAL: the returned SecNonce MUST be used for at most one signature.
pub fn generate_musig2_nonce_for_input(
    psbt: &TaprootPsbt,
    index: usize,
    root: &RootWalletKey,
    session_id: Option<&[u8]>,
) -> Result<Option<(SecNonce, ProprietaryKeyValue)>> {
    check_session_id(session_id)?;
    let input = psbt.input(index)?;
    if input.tap_internal_key.is_none() {
        return Ok(None);
    }
    if input.tap_merkle_root.is_none() {
        return Err(PsbtError::MissingField {
            index,
            field: "tapMerkleRoot",
        });
    }
    if input.tap_key_origins.is_empty() {
        return Err(PsbtError::MissingField {
            index,
            field: "tapBip32Derivation",
        });
    }

    let participants = verified_musig2_participants(psbt, index)?;
    let (seckey, pubkey) = derive_participant_key(input, index, root)?;
    if !participants.participant_pub_keys.contains(&pubkey) {
        return Err(PsbtError::SignerNotParticipant(pubkey.to_string()));
    }

    let (sighash, _) = psbt.taproot_hash_for_sig_checked(index, None)?;

    let mut nonce_seed = [0u8; 32];
    match session_id {
        Some(id) => nonce_seed.copy_from_slice(id),
        None => rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce_seed),
    }

    let message = sighash.to_byte_array();
    let extra_input = pubkey.serialize();
    let secnonce = SecNonce::build(nonce_seed)
        .with_seckey(seckey_to_musig(&seckey)?)
        .with_aggregated_pubkey(xonly_to_musig(&participants.tap_output_key)?)
        .with_message(&message)
        .with_extra_input(&extra_input)
        .build();

    let record = encode_psbt_musig2_pub_nonce(&Musig2PubNonce {
        participant_pub_key: pubkey,
        tap_output_key: participants.tap_output_key,
        pub_nonce: secnonce.public_nonce().serialize().to_vec(),
    })?;

    log::debug!("Generated MuSig2 nonce for input {} (participant {})", index, pubkey);
    Ok(Some((secnonce, record)))
}

/// Generate nonces for every MuSig2 input and attach the pub nonce records.
///
/// Returns the secret nonces by input index; the caller keeps them for the
/// signing round.
pub fn set_musig2_nonces(
    psbt: &mut TaprootPsbt,
    root: &RootWalletKey,
    session_id: Option<&[u8]>,
) -> Result<Vec<(usize, SecNonce)>> {
    if root.is_neutered() {
        return Err(PsbtError::NeuteredKey);
    }
    check_session_id(session_id)?;

    let mut secnonces = Vec::new();
    for index in 0..psbt.psbt().inputs.len() {
        if let Some((secnonce, record)) = generate_musig2_nonce_for_input(psbt, index, root, session_id)? {
            psbt.add_proprietary_key_val_to_input(index, &record)?;
            secnonces.push((index, secnonce));
        }
    }
    Ok(secnonces)
}
