//! PSBT wrapper for taproot script-path signing and finalization.
//!
//! [`TaprootPsbt`] owns a rust-bitcoin [`Psbt`] plus the signer's
//! [`PsbtConfig`]. Script-path inputs carry exactly one leaf in
//! `tap_scripts`; key-path (MuSig2) inputs only get nonces here, see
//! [`crate::musig`].

use std::collections::HashMap;

use bitcoin::bip32::Xpriv;
use bitcoin::hashes::Hash;
use bitcoin::key::Keypair;
use bitcoin::psbt::{raw, Input, Psbt};
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighash, TapSighashType};
use bitcoin::taproot::{self, TapLeafHash};
use bitcoin::{ecdsa, Script, ScriptBuf, Transaction, TxOut, Txid, Witness};
use miniscript::psbt::PsbtExt;
use tapsig_core::{hash_tap_leaf, parse_n_of_n_tapscript, tweaked_output_key};

use crate::config::PsbtConfig;
use crate::error::{PsbtError, Result};
use crate::proprietary::{ProprietaryKeyData, ProprietaryKeySearch, ProprietaryKeyValue};

#[derive(Debug, Clone, PartialEq)]
pub struct TaprootPsbt {
    psbt: Psbt,
    config: PsbtConfig,
}

impl TaprootPsbt {
    pub fn new(psbt: Psbt) -> Self {
        Self::with_config(psbt, PsbtConfig::default())
    }

    pub fn with_config(psbt: Psbt, config: PsbtConfig) -> Self {
        TaprootPsbt { psbt, config }
    }

    pub fn from_unsigned_tx(tx: Transaction) -> Result<Self> {
        Psbt::from_unsigned_tx(tx)
            .map(Self::new)
            .map_err(|e| PsbtError::Encoding(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Psbt::deserialize(bytes)
            .map(Self::new)
            .map_err(|e| PsbtError::Encoding(e.to_string()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.psbt.serialize()
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| PsbtError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn psbt_mut(&mut self) -> &mut Psbt {
        &mut self.psbt
    }

    pub fn into_psbt(self) -> Psbt {
        self.psbt
    }

    pub fn config(&self) -> &PsbtConfig {
        &self.config
    }

    pub fn input(&self, index: usize) -> Result<&Input> {
        self.psbt
            .inputs
            .get(index)
            .ok_or(PsbtError::InputIndexOutOfRange {
                index,
                count: self.psbt.inputs.len(),
            })
    }

    fn input_mut(&mut self, index: usize) -> Result<&mut Input> {
        let count = self.psbt.inputs.len();
        self.psbt
            .inputs
            .get_mut(index)
            .ok_or(PsbtError::InputIndexOutOfRange { index, count })
    }

    /// Extract the network transaction once every input is finalized.
    pub fn extract_tx(&self) -> Result<Transaction> {
        self.psbt
            .clone()
            .extract_tx()
            .map_err(|e| PsbtError::Finalize(e.to_string()))
    }

    // ─── Input state ────────────────────────────────────────────────────────

    pub fn is_input_finalized(&self, index: usize) -> Result<bool> {
        let input = self.input(index)?;
        Ok(input.final_script_sig.is_some() || input.final_script_witness.is_some())
    }

    fn ensure_not_finalized(&self, index: usize) -> Result<()> {
        if self.is_input_finalized(index)? {
            return Err(PsbtError::InputFinalized(index));
        }
        Ok(())
    }

    /// Signatures collected on an unfinalized input, ECDSA or tapscript.
    pub fn signature_count(&self, index: usize) -> Result<usize> {
        self.ensure_not_finalized(index)?;
        let input = self.input(index)?;
        Ok(input.partial_sigs.len().max(input.tap_script_sigs.len()))
    }

    /// Fails if any input already carries a signature. `what` names the
    /// field the caller is about to change.
    pub fn check_for_signatures(&self, what: Option<&str>) -> Result<()> {
        let signed = self.psbt.inputs.iter().any(|input| {
            !input.partial_sigs.is_empty()
                || !input.tap_script_sigs.is_empty()
                || input.tap_key_sig.is_some()
        });
        if signed {
            return Err(PsbtError::SignaturesExist(
                what.unwrap_or("transaction").to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_taproot_input(&self, index: usize) -> Result<bool> {
        let input = self.input(index)?;
        let by_fields = input.tap_internal_key.is_some()
            || input.tap_merkle_root.is_some()
            || !input.tap_scripts.is_empty()
            || !input.tap_key_origins.is_empty()
            || !input.tap_script_sigs.is_empty()
            || input.tap_key_sig.is_some();
        let by_utxo = input
            .witness_utxo
            .as_ref()
            .map_or(false, |utxo| tweaked_output_key(&utxo.script_pubkey).is_ok());
        Ok(by_fields || by_utxo)
    }

    // ─── Previous outputs ───────────────────────────────────────────────────

    /// The output spent by an input. A `non_witness_utxo` must hash to the
    /// prevout txid.
    pub fn prevout(&self, index: usize) -> Result<TxOut> {
        let input = self.input(index)?;
        if let Some(tx) = &input.non_witness_utxo {
            let outpoint = self
                .psbt
                .unsigned_tx
                .input
                .get(index)
                .map(|txin| txin.previous_output)
                .ok_or(PsbtError::MissingUtxo { index })?;
            if tx.compute_txid() != outpoint.txid {
                return Err(PsbtError::NonWitnessUtxoMismatch { index });
            }
            return tx
                .output
                .get(outpoint.vout as usize)
                .cloned()
                .ok_or(PsbtError::MissingUtxo { index });
        }
        input
            .witness_utxo
            .clone()
            .ok_or(PsbtError::MissingUtxo { index })
    }

    fn prevouts(&self) -> Result<Vec<TxOut>> {
        (0..self.psbt.inputs.len())
            .map(|index| self.prevout(index))
            .collect()
    }

    fn is_segwit_input(input: &Input, utxo: &TxOut) -> bool {
        utxo.script_pubkey.is_witness_program()
            || (utxo.script_pubkey.is_p2sh()
                && input
                    .redeem_script
                    .as_ref()
                    .map_or(false, |script| script.is_witness_program()))
    }

    /// Distinct txids of inputs that spend non-segwit outputs and so need a
    /// full previous transaction. Every input needs a `witness_utxo`.
    pub fn non_witness_previous_txids(&self) -> Result<Vec<Txid>> {
        let mut txids = Vec::new();
        for (input, txin) in self.psbt.inputs.iter().zip(&self.psbt.unsigned_tx.input) {
            let utxo = input
                .witness_utxo
                .as_ref()
                .ok_or(PsbtError::MissingWitnessUtxo)?;
            let txid = txin.previous_output.txid;
            if !Self::is_segwit_input(input, utxo) && !txids.contains(&txid) {
                txids.push(txid);
            }
        }
        Ok(txids)
    }

    /// Attach `non_witness_utxo` to every non-segwit input.
    pub fn add_non_witness_utxos(&mut self, txs: &HashMap<Txid, Transaction>) -> Result<()> {
        self.check_for_signatures(Some("nonWitnessUtxo"))?;
        let needed = self.non_witness_previous_txids()?;
        if needed.iter().any(|txid| !txs.contains_key(txid)) {
            return Err(PsbtError::MissingPreviousTransaction);
        }

        for index in 0..self.psbt.inputs.len() {
            let txid = self.psbt.unsigned_tx.input[index].previous_output.txid;
            if !needed.contains(&txid) {
                continue;
            }
            let tx = txs.get(&txid).ok_or(PsbtError::MissingPreviousTransaction)?;
            if tx.compute_txid() != txid {
                return Err(PsbtError::NonWitnessUtxoMismatch { index });
            }
            self.psbt.inputs[index].non_witness_utxo = Some(tx.clone());
        }
        Ok(())
    }

    // ─── Sighash ────────────────────────────────────────────────────────────

    /// BIP-341 sighash of an input. The input's `sighash_type` (absent means
    /// SIGHASH_DEFAULT) must be one of `allowed`. With a leaf hash this is
    /// the script-path message, otherwise the key-path message.
    pub fn taproot_hash_for_sig(
        &self,
        index: usize,
        allowed: &[TapSighashType],
        leaf_hash: Option<TapLeafHash>,
    ) -> Result<(TapSighash, TapSighashType)> {
        let input = self.input(index)?;
        let sighash_type = match input.sighash_type {
            Some(ty) => ty
                .taproot_hash_ty()
                .map_err(|_| PsbtError::SighashNotAllowed(ty.to_u32()))?,
            None => TapSighashType::Default,
        };
        if !allowed.contains(&sighash_type) {
            return Err(PsbtError::SighashNotAllowed(sighash_type as u32));
        }

        let prevouts = self.prevouts()?;
        let prevouts = Prevouts::All(&prevouts);
        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);
        let sighash = match leaf_hash {
            Some(leaf_hash) => {
                cache.taproot_script_spend_signature_hash(index, &prevouts, leaf_hash, sighash_type)
            }
            None => cache.taproot_key_spend_signature_hash(index, &prevouts, sighash_type),
        }
        .map_err(|e| PsbtError::Sighash(e.to_string()))?;
        Ok((sighash, sighash_type))
    }

    /// [`Self::taproot_hash_for_sig`] for a taproot input with the configured
    /// sighash types.
    pub fn taproot_hash_for_sig_checked(
        &self,
        index: usize,
        leaf_hash: Option<TapLeafHash>,
    ) -> Result<(TapSighash, TapSighashType)> {
        if !self.is_taproot_input(index)? {
            return Err(PsbtError::NotTaproot(index));
        }
        let allowed = self.config.allowed_sighash_types()?;
        self.taproot_hash_for_sig(index, &allowed, leaf_hash)
    }

    fn ecdsa_sighash_type(&self, index: usize) -> Result<EcdsaSighashType> {
        match self.input(index)?.sighash_type {
            Some(ty) => ty
                .ecdsa_hash_ty()
                .map_err(|_| PsbtError::SighashNotAllowed(ty.to_u32())),
            None => Ok(EcdsaSighashType::All),
        }
    }

    fn ecdsa_sighash(&self, index: usize, sighash_type: EcdsaSighashType) -> Result<Message> {
        let input = self.input(index)?;
        let prevout = self.prevout(index)?;
        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);

        let digest = if let Some(witness_script) = &input.witness_script {
            cache
                .p2wsh_signature_hash(index, witness_script, prevout.value, sighash_type)
                .map_err(|e| PsbtError::Sighash(e.to_string()))?
                .to_byte_array()
        } else {
            let script = input.redeem_script.as_ref().unwrap_or(&prevout.script_pubkey);
            if script.is_p2wpkh() {
                cache
                    .p2wpkh_signature_hash(index, script, prevout.value, sighash_type)
                    .map_err(|e| PsbtError::Sighash(e.to_string()))?
                    .to_byte_array()
            } else {
                cache
                    .legacy_signature_hash(index, script, sighash_type.to_u32())
                    .map_err(|e| PsbtError::Sighash(e.to_string()))?
                    .to_byte_array()
            }
        };
        Ok(Message::from_digest(digest))
    }

    // ─── Signing ────────────────────────────────────────────────────────────

    /// The single leaf of a script-path input.
    fn single_tap_leaf(&self, index: usize) -> Result<(taproot::ControlBlock, ScriptBuf, TapLeafHash)> {
        let input = self.input(index)?;
        if input.tap_scripts.len() != 1 {
            return Err(PsbtError::LeafScriptCount {
                index,
                count: input.tap_scripts.len(),
            });
        }
        let (control_block, (script, leaf_version)) = input
            .tap_scripts
            .iter()
            .next()
            .ok_or(PsbtError::LeafScriptCount { index, count: 0 })?;
        if control_block.leaf_version != *leaf_version {
            return Err(PsbtError::LeafVersionMismatch {
                script: leaf_version.to_consensus(),
                control_block: control_block.leaf_version.to_consensus(),
            });
        }
        let leaf_hash = hash_tap_leaf(script, leaf_version.to_consensus());
        Ok((control_block.clone(), script.clone(), leaf_hash))
    }

    /// Schnorr-sign the script-path leaf of an input.
    ///
    /// The signer may only sign for the leaves in `leaf_hashes`. Key-path
    /// inputs (no `tap_scripts`) are refused.
    pub fn sign_taproot_input(
        &mut self,
        index: usize,
        keypair: &Keypair,
        leaf_hashes: &[TapLeafHash],
        sighash_types: &[TapSighashType],
    ) -> Result<()> {
        self.ensure_not_finalized(index)?;
        if self.input(index)?.tap_scripts.is_empty() {
            return Err(PsbtError::KeyPathSigningUnsupported);
        }
        let (_, _, leaf_hash) = self.single_tap_leaf(index)?;
        if !leaf_hashes.contains(&leaf_hash) {
            return Err(PsbtError::LeafNotPermitted(leaf_hash.to_string()));
        }

        let (sighash, sighash_type) =
            self.taproot_hash_for_sig(index, sighash_types, Some(leaf_hash))?;
        let secp = Secp256k1::new();
        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = secp.sign_schnorr(&msg, keypair);
        let (xonly, _) = keypair.x_only_public_key();

        self.input_mut(index)?.tap_script_sigs.insert(
            (xonly, leaf_hash),
            taproot::Signature {
                signature,
                sighash_type,
            },
        );
        log::debug!("Signed input {} leaf {} with {}", index, leaf_hash, xonly);
        Ok(())
    }

    /// Sign a script-path input with every key the root derives among its
    /// `tap_key_origins`.
    pub fn sign_taproot_input_hd(&mut self, index: usize, root: &Xpriv) -> Result<()> {
        let secp = Secp256k1::new();
        let input = self.input(index)?;
        if input.tap_key_origins.is_empty() {
            return Err(PsbtError::MissingField {
                index,
                field: "tapBip32Derivation",
            });
        }

        let fingerprint = root.fingerprint(&secp);
        let mut signers = Vec::new();
        for (xonly, (leaf_hashes, (fp, path))) in &input.tap_key_origins {
            if *fp != fingerprint {
                continue;
            }
            let child = root
                .derive_priv(&secp, path)
                .map_err(|e| PsbtError::Derivation(e.to_string()))?;
            let keypair = child.to_keypair(&secp);
            if keypair.x_only_public_key().0 != *xonly {
                return Err(PsbtError::DerivationMismatch(path.to_string()));
            }
            signers.push((keypair, leaf_hashes.clone()));
        }
        if signers.is_empty() {
            return Err(PsbtError::NoMatchingDerivation(index));
        }

        let sighash_types = self.config.allowed_sighash_types()?;
        for (keypair, leaf_hashes) in signers {
            self.sign_taproot_input(index, &keypair, &leaf_hashes, &sighash_types)?;
        }
        Ok(())
    }

    /// ECDSA-sign a non-taproot input with every key the root derives among
    /// its `bip32_derivation`.
    pub fn sign_input_hd(&mut self, index: usize, root: &Xpriv) -> Result<()> {
        self.ensure_not_finalized(index)?;
        let secp = Secp256k1::new();
        let fingerprint = root.fingerprint(&secp);

        let mut keys = Vec::new();
        for (pubkey, (fp, path)) in &self.input(index)?.bip32_derivation {
            if *fp != fingerprint {
                continue;
            }
            let child = root
                .derive_priv(&secp, path)
                .map_err(|e| PsbtError::Derivation(e.to_string()))?;
            if child.private_key.public_key(&secp) != *pubkey {
                return Err(PsbtError::DerivationMismatch(path.to_string()));
            }
            keys.push(child.private_key);
        }
        if keys.is_empty() {
            return Err(PsbtError::NoMatchingDerivation(index));
        }

        let sighash_type = self.ecdsa_sighash_type(index)?;
        let msg = self.ecdsa_sighash(index, sighash_type)?;
        for key in keys {
            let signature = secp.sign_ecdsa(&msg, &key);
            self.input_mut(index)?.partial_sigs.insert(
                bitcoin::PublicKey::new(key.public_key(&secp)),
                ecdsa::Signature {
                    signature,
                    sighash_type,
                },
            );
        }
        log::debug!("Signed input {} with ECDSA", index);
        Ok(())
    }

    /// Sign every input the root key can sign. Fails only if none could be
    /// signed.
    pub fn sign_all_inputs_hd(&mut self, root: &Xpriv) -> Result<()> {
        let mut signed = 0;
        for index in 0..self.psbt.inputs.len() {
            let result = if self.is_taproot_input(index)? {
                self.sign_taproot_input_hd(index, root)
            } else {
                self.sign_input_hd(index, root)
            };
            match result {
                Ok(()) => signed += 1,
                Err(e) => log::debug!("Input {} not signed: {}", index, e),
            }
        }
        if signed == 0 {
            return Err(PsbtError::NoInputsSigned);
        }
        Ok(())
    }

    // ─── Finalization ───────────────────────────────────────────────────────

    fn check_script_path_commitment(
        &self,
        index: usize,
        control_block: &taproot::ControlBlock,
        script: &Script,
    ) -> Result<()> {
        let output_key = tweaked_output_key(&self.prevout(index)?.script_pubkey)?;
        let parsed = tapsig_core::ControlBlock::parse(&control_block.serialize())?;
        if !parsed.verify_taproot_commitment(&output_key, script)? {
            return Err(PsbtError::Finalize(format!(
                "input {}: control block does not commit to the spent output key",
                index
            )));
        }
        Ok(())
    }

    fn set_final_witness(&mut self, index: usize, witness: Witness) -> Result<()> {
        let input = self.input_mut(index)?;
        input.final_script_witness = Some(witness);
        clear_finalized_input(input);
        log::debug!("Finalized input {}", index);
        Ok(())
    }

    /// Finalize an n-of-n checksig leaf.
    ///
    /// The witness is `[sig_n, ..., sig_1, script, control block]`: the
    /// script pops signatures in reverse key order.
    pub fn finalize_taproot_input(&mut self, index: usize) -> Result<()> {
        self.ensure_not_finalized(index)?;
        let (control_block, script, leaf_hash) = self.single_tap_leaf(index)?;
        let pubkeys = parse_n_of_n_tapscript(&script)?;
        self.check_script_path_commitment(index, &control_block, &script)?;

        let input = self.input(index)?;
        let mut witness = Witness::new();
        for pubkey in pubkeys.iter().rev() {
            let sig = input
                .tap_script_sigs
                .get(&(*pubkey, leaf_hash))
                .ok_or(PsbtError::MissingSignature {
                    index,
                    pubkey: *pubkey,
                })?;
            witness.push(sig.to_vec());
        }
        witness.push(script.as_bytes());
        witness.push(control_block.serialize());
        self.set_final_witness(index, witness)
    }

    /// Finalize a leaf satisfied by exactly one signature:
    /// `[sig, script, control block]`.
    pub fn finalize_tap_input_with_single_leaf_script_and_signature(
        &mut self,
        index: usize,
    ) -> Result<()> {
        self.ensure_not_finalized(index)?;
        let (control_block, script, _) = self.single_tap_leaf(index)?;
        let input = self.input(index)?;
        if input.tap_script_sigs.len() != 1 {
            return Err(PsbtError::SignatureCount {
                index,
                expected: 1,
                found: input.tap_script_sigs.len(),
            });
        }
        let sig = input
            .tap_script_sigs
            .values()
            .next()
            .ok_or(PsbtError::SignatureCount {
                index,
                expected: 1,
                found: 0,
            })?
            .to_vec();
        self.check_script_path_commitment(index, &control_block, &script)?;

        let mut witness = Witness::new();
        witness.push(sig);
        witness.push(script.as_bytes());
        witness.push(control_block.serialize());
        self.set_final_witness(index, witness)
    }

    /// Finalize every input that is not final yet. Taproot script-path inputs
    /// are handled here; everything else goes through miniscript.
    pub fn finalize_all_inputs(&mut self) -> Result<()> {
        if self.psbt.inputs.is_empty() {
            return Err(PsbtError::InputIndexOutOfRange { index: 0, count: 0 });
        }
        let secp = Secp256k1::verification_only();
        for index in 0..self.psbt.inputs.len() {
            if self.is_input_finalized(index)? {
                continue;
            }
            if !self.psbt.inputs[index].tap_script_sigs.is_empty() {
                let (_, script, _) = self.single_tap_leaf(index)?;
                if parse_n_of_n_tapscript(&script).is_ok() {
                    self.finalize_taproot_input(index)?;
                } else {
                    self.finalize_tap_input_with_single_leaf_script_and_signature(index)?;
                }
            } else {
                self.psbt
                    .finalize_inp_mut(&secp, index)
                    .map_err(|e| PsbtError::Finalize(format!("input {}: {}", index, e)))?;
            }
        }
        Ok(())
    }

    // ─── Validation ─────────────────────────────────────────────────────────

    /// Verify the schnorr script-path signatures of an input, optionally only
    /// those by `pubkey`. `None` when there is nothing to verify.
    pub fn validate_taproot_signatures(
        &self,
        index: usize,
        pubkey: Option<&PublicKey>,
    ) -> Result<Option<bool>> {
        let input = self.input(index)?;
        let filter = pubkey.map(|pk| pk.x_only_public_key().0);
        let sigs: Vec<_> = input
            .tap_script_sigs
            .iter()
            .filter(|((xonly, _), _)| filter.map_or(true, |f| f == *xonly))
            .map(|(key, sig)| (*key, *sig))
            .collect();
        if sigs.is_empty() {
            return Ok(None);
        }

        let secp = Secp256k1::verification_only();
        for ((xonly, leaf_hash), sig) in sigs {
            let (sighash, _) =
                self.taproot_hash_for_sig(index, &[sig.sighash_type], Some(leaf_hash))?;
            let msg = Message::from_digest(sighash.to_byte_array());
            if secp.verify_schnorr(&sig.signature, &msg, &xonly).is_err() {
                log::warn!("Input {}: invalid schnorr signature by {}", index, xonly);
                return Ok(Some(false));
            }
        }
        Ok(Some(true))
    }

    /// Verify the ECDSA partial signatures of an input, optionally only those
    /// by `pubkey`. `None` when there is nothing to verify.
    pub fn validate_ecdsa_signatures(
        &self,
        index: usize,
        pubkey: Option<&PublicKey>,
    ) -> Result<Option<bool>> {
        let input = self.input(index)?;
        let sigs: Vec<_> = input
            .partial_sigs
            .iter()
            .filter(|(pk, _)| pubkey.map_or(true, |p| pk.inner == *p))
            .map(|(pk, sig)| (*pk, *sig))
            .collect();
        if sigs.is_empty() {
            return Ok(None);
        }

        let secp = Secp256k1::verification_only();
        for (pk, sig) in sigs {
            let msg = self.ecdsa_sighash(index, sig.sighash_type)?;
            if secp.verify_ecdsa(&msg, &sig.signature, &pk.inner).is_err() {
                log::warn!("Input {}: invalid ECDSA signature by {}", index, pk);
                return Ok(Some(false));
            }
        }
        Ok(Some(true))
    }

    fn validate_input_signatures(&self, index: usize, pubkey: Option<&PublicKey>) -> Result<bool> {
        let result = if self.input(index)?.tap_script_sigs.is_empty() {
            self.validate_ecdsa_signatures(index, pubkey)?
        } else {
            self.validate_taproot_signatures(index, pubkey)?
        };
        Ok(result.unwrap_or(false))
    }

    /// True iff every input carries signatures and all of them verify.
    pub fn validate_signatures_of_all_inputs(&self) -> Result<bool> {
        if self.psbt.inputs.is_empty() {
            return Err(PsbtError::InputIndexOutOfRange { index: 0, count: 0 });
        }
        let results = (0..self.psbt.inputs.len())
            .map(|index| self.validate_input_signatures(index, None))
            .collect::<Result<Vec<_>>>()?;
        Ok(results.into_iter().all(|valid| valid))
    }

    /// One entry per global xpub, in key order: whether that xpub's key has
    /// a valid signature on the input.
    pub fn signature_validation_array(&self, index: usize) -> Result<Vec<bool>> {
        self.input(index)?;
        if self.psbt.xpub.len() != self.config.global_xpub_count {
            return Err(PsbtError::GlobalXpubCount {
                expected: self.config.global_xpub_count,
                found: self.psbt.xpub.len(),
            });
        }
        self.psbt
            .xpub
            .keys()
            .map(|xpub| self.validate_input_signatures(index, Some(&xpub.public_key)))
            .collect()
    }

    // ─── Proprietary key-values ─────────────────────────────────────────────

    pub fn add_proprietary_key_val_to_input(
        &mut self,
        index: usize,
        kv: &ProprietaryKeyValue,
    ) -> Result<()> {
        self.input_mut(index)?
            .proprietary
            .insert(raw::ProprietaryKey::from(&kv.key), kv.value.clone());
        Ok(())
    }

    /// Proprietary records of an input, all of them or those matching
    /// `search`.
    pub fn get_proprietary_key_vals(
        &self,
        index: usize,
        search: Option<&ProprietaryKeySearch>,
    ) -> Result<Vec<ProprietaryKeyValue>> {
        let input = self.input(index)?;
        let mut out = Vec::new();
        for (key, value) in &input.proprietary {
            if let Some(search) = search {
                if key.prefix != search.identifier.as_bytes() {
                    continue;
                }
            }
            let key = ProprietaryKeyData::try_from(key)?;
            if search.map_or(true, |s| s.matches(&key)) {
                out.push(ProprietaryKeyValue {
                    key,
                    value: value.clone(),
                });
            }
        }
        Ok(out)
    }
}

/// Drop everything but the UTXOs, final fields and foreign records.
fn clear_finalized_input(input: &mut Input) {
    input.partial_sigs.clear();
    input.sighash_type = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.bip32_derivation.clear();
    input.ripemd160_preimages.clear();
    input.sha256_preimages.clear();
    input.hash160_preimages.clear();
    input.hash256_preimages.clear();
    input.tap_key_sig = None;
    input.tap_script_sigs.clear();
    input.tap_scripts.clear();
    input.tap_key_origins.clear();
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
}

impl From<Psbt> for TaprootPsbt {
    fn from(psbt: Psbt) -> Self {
        TaprootPsbt::new(psbt)
    }
}
