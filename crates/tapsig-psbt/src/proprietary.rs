//! PSBT proprietary key-values (BIP-174 type `0xFC`).
//!
//! ```text
//! key   = 0xFC || compact_size(len(identifier)) || identifier || compact_size(subtype) || keydata
//! value = opaque bytes
//! ```
//!
//! Inputs store them in `Input::proprietary`, keyed by rust-bitcoin's
//! [`raw::ProprietaryKey`], which round-trips through PSBT serialization.

use bitcoin::consensus::encode::{deserialize_partial, serialize, VarInt};
use bitcoin::psbt::raw;

use crate::error::{PsbtError, Result};

/// Identifier of this wallet's proprietary records.
pub const PSBT_PROPRIETARY_IDENTIFIER: &str = "BITGO";

/// BIP-174 key type of proprietary entries.
pub const PSBT_PROPRIETARY_KEY_TYPE: u8 = 0xfc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProprietaryKeySubtype {
    Musig2ParticipantPubKeys = 0x01,
    Musig2PubNonce = 0x02,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProprietaryKeyData {
    pub identifier: String,
    pub subtype: u8,
    pub keydata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProprietaryKeyValue {
    pub key: ProprietaryKeyData,
    pub value: Vec<u8>,
}

/// Filter for [`crate::TaprootPsbt::get_proprietary_key_vals`]. `keydata`
/// narrows the match when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProprietaryKeySearch {
    pub identifier: String,
    pub subtype: u8,
    pub keydata: Option<Vec<u8>>,
}

impl ProprietaryKeySearch {
    pub fn new(subtype: ProprietaryKeySubtype) -> Self {
        ProprietaryKeySearch {
            identifier: PSBT_PROPRIETARY_IDENTIFIER.to_string(),
            subtype: subtype as u8,
            keydata: None,
        }
    }

    pub fn matches(&self, key: &ProprietaryKeyData) -> bool {
        self.identifier == key.identifier
            && self.subtype == key.subtype
            && self.keydata.as_ref().map_or(true, |k| *k == key.keydata)
    }
}

pub fn encode_proprietary_key(key: &ProprietaryKeyData) -> Vec<u8> {
    let mut out = vec![PSBT_PROPRIETARY_KEY_TYPE];
    out.extend(serialize(&VarInt(key.identifier.len() as u64)));
    out.extend_from_slice(key.identifier.as_bytes());
    out.extend(serialize(&VarInt(u64::from(key.subtype))));
    out.extend_from_slice(&key.keydata);
    out
}

pub fn decode_proprietary_key(bytes: &[u8]) -> Result<ProprietaryKeyData> {
    let (key_type, rest) = bytes
        .split_first()
        .ok_or_else(|| PsbtError::InvalidProprietaryKey("empty key".to_string()))?;
    if *key_type != PSBT_PROPRIETARY_KEY_TYPE {
        return Err(PsbtError::InvalidProprietaryKey(format!(
            "key type 0x{:02x} is not proprietary",
            key_type
        )));
    }

    let (VarInt(id_len), consumed) = deserialize_partial::<VarInt>(rest)
        .map_err(|e| PsbtError::InvalidProprietaryKey(format!("identifier length: {}", e)))?;
    let rest = &rest[consumed..];
    let id_len = usize::try_from(id_len)
        .ok()
        .filter(|len| *len <= rest.len())
        .ok_or_else(|| {
            PsbtError::InvalidProprietaryKey(format!("identifier length {} out of range", id_len))
        })?;
    let identifier = String::from_utf8(rest[..id_len].to_vec())
        .map_err(|e| PsbtError::InvalidProprietaryKey(format!("identifier: {}", e)))?;
    let rest = &rest[id_len..];

    let (VarInt(subtype), consumed) = deserialize_partial::<VarInt>(rest)
        .map_err(|e| PsbtError::InvalidProprietaryKey(format!("subtype: {}", e)))?;
    let subtype = u8::try_from(subtype)
        .map_err(|_| PsbtError::InvalidProprietaryKey(format!("subtype {} out of range", subtype)))?;

    Ok(ProprietaryKeyData {
        identifier,
        subtype,
        keydata: rest[consumed..].to_vec(),
    })
}

impl From<&ProprietaryKeyData> for raw::ProprietaryKey {
    fn from(key: &ProprietaryKeyData) -> Self {
        raw::ProprietaryKey {
            prefix: key.identifier.as_bytes().to_vec(),
            subtype: key.subtype,
            key: key.keydata.clone(),
        }
    }
}

impl TryFrom<&raw::ProprietaryKey> for ProprietaryKeyData {
    type Error = PsbtError;

    fn try_from(key: &raw::ProprietaryKey) -> Result<Self> {
        let identifier = String::from_utf8(key.prefix.clone())
            .map_err(|e| PsbtError::InvalidProprietaryKey(format!("identifier: {}", e)))?;
        Ok(ProprietaryKeyData {
            identifier,
            subtype: key.subtype,
            keydata: key.key.clone(),
        })
    }
}
