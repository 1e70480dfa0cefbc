//! Wallet fixtures shared by the unit tests.
//!
//! Three root keys (user = 1, backup = 2, bitgo = 3) derive child keys at
//! [`WALLET_PATH`]. The output has a user+bitgo MuSig2 key path and three
//! 2-of-2 leaves: user+bitgo at depth 1, user+backup and backup+bitgo at
//! depth 2.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::hashes::Hash;
use bitcoin::psbt::Input;
use bitcoin::secp256k1::{PublicKey, Secp256k1};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use tapsig_core::{build_n_of_n_tapscript, KeyPathKeys, P2trPayment, TapRedeem};

use crate::musig::{encode_psbt_musig2_participants, Musig2Participants};
use crate::psbt::TaprootPsbt;

pub(crate) const WALLET_PATH: &str = "m/0/0/30/7";

pub(crate) fn test_root_key(seed: u8) -> Xpriv {
    Xpriv::new_master(Network::Testnet, &[seed; 32]).unwrap()
}

pub(crate) fn wallet_child(seed: u8) -> (Fingerprint, DerivationPath, PublicKey) {
    let secp = Secp256k1::new();
    let root = test_root_key(seed);
    let path = DerivationPath::from_str(WALLET_PATH).unwrap();
    let child = root.derive_priv(&secp, &path).unwrap();
    (root.fingerprint(&secp), path, child.private_key.public_key(&secp))
}

pub(crate) struct ScriptPathFixture {
    pub psbt: TaprootPsbt,
    pub script: ScriptBuf,
    pub leaf_hash: TapLeafHash,
}

fn wallet_payment() -> (P2trPayment, ScriptBuf) {
    let (_, _, user) = wallet_child(1);
    let (_, _, backup) = wallet_child(2);
    let (_, _, bitgo) = wallet_child(3);
    let x = |pk: PublicKey| pk.x_only_public_key().0;

    let user_bitgo = build_n_of_n_tapscript(&[x(user), x(bitgo)]).unwrap();
    let user_backup = build_n_of_n_tapscript(&[x(user), x(backup)]).unwrap();
    let backup_bitgo = build_n_of_n_tapscript(&[x(backup), x(bitgo)]).unwrap();
    let payment = P2trPayment::new(
        KeyPathKeys::Plain(vec![user, bitgo]),
        vec![
            TapRedeem::with_depth(user_bitgo, 1),
            TapRedeem::with_depth(user_backup.clone(), 2),
            TapRedeem::with_depth(backup_bitgo, 2),
        ],
    )
    .unwrap();
    (payment, user_backup)
}

/// One-input PSBT spending `payment` back to itself, 1000 sat fee.
fn spend_psbt(payment: &P2trPayment) -> TaprootPsbt {
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0x42; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(99_000),
            script_pubkey: payment.output_script(),
        }],
    };
    let mut psbt = TaprootPsbt::from_unsigned_tx(tx).unwrap();
    psbt.psbt_mut().inputs[0].witness_utxo = Some(TxOut {
        value: Amount::from_sat(100_000),
        script_pubkey: payment.output_script(),
    });

    let secp = Secp256k1::new();
    for seed in 1..=3 {
        let xpub = Xpub::from_priv(&secp, &test_root_key(seed));
        psbt.psbt_mut()
            .xpub
            .insert(xpub, (xpub.fingerprint(), DerivationPath::master()));
    }
    psbt
}

/// Spends the user+backup leaf.
pub(crate) fn script_path_psbt() -> ScriptPathFixture {
    let (payment, script) = wallet_payment();
    let mut psbt = spend_psbt(&payment);

    let control_block =
        bitcoin::taproot::ControlBlock::decode(&payment.control_block(1).unwrap().serialize())
            .unwrap();
    let leaf_hash = TapLeafHash::from_script(&script, LeafVersion::TapScript);

    let input = &mut psbt.psbt_mut().inputs[0];
    input
        .tap_scripts
        .insert(control_block, (script.clone(), LeafVersion::TapScript));
    for seed in [1, 2] {
        let (fp, path, pk) = wallet_child(seed);
        input
            .tap_key_origins
            .insert(pk.x_only_public_key().0, (vec![leaf_hash], (fp, path)));
    }
    input.tap_internal_key = Some(payment.internal_pubkey());
    input.tap_merkle_root = payment.merkle_root();

    ScriptPathFixture {
        psbt,
        script,
        leaf_hash,
    }
}

/// Key-path input with a user+bitgo participants record.
pub(crate) fn musig2_key_path_psbt() -> (TaprootPsbt, Musig2Participants) {
    let (payment, _) = wallet_payment();
    let mut psbt = spend_psbt(&payment);

    let (_, _, user) = wallet_child(1);
    let (_, _, bitgo) = wallet_child(3);
    let participants = Musig2Participants {
        tap_output_key: payment.output_key(),
        tap_internal_key: payment.internal_pubkey(),
        participant_pub_keys: [user, bitgo],
    };

    let input = &mut psbt.psbt_mut().inputs[0];
    input.tap_internal_key = Some(payment.internal_pubkey());
    input.tap_merkle_root = payment.merkle_root();
    for seed in [1, 3] {
        let (fp, path, pk) = wallet_child(seed);
        input
            .tap_key_origins
            .insert(pk.x_only_public_key().0, (vec![], (fp, path)));
    }
    psbt.add_proprietary_key_val_to_input(0, &encode_psbt_musig2_participants(&participants))
        .unwrap();

    (psbt, participants)
}

/// Append a P2WPKH input owned by `seed`'s wallet key. The output absorbs
/// the value so the fee is unchanged. Returns the funding transaction.
pub(crate) fn add_p2wpkh_input(psbt: &mut TaprootPsbt, seed: u8, value: u64) -> Transaction {
    let (fp, path, pk) = wallet_child(seed);
    let script_pubkey = ScriptBuf::new_p2wpkh(&CompressedPublicKey(pk).wpubkey_hash());
    let prev_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0x43; 32]), 1),
            ..Default::default()
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        }],
    };

    let inner = psbt.psbt_mut();
    inner.unsigned_tx.input.push(TxIn {
        previous_output: OutPoint::new(prev_tx.compute_txid(), 0),
        ..Default::default()
    });
    inner.unsigned_tx.output[0].value = inner.unsigned_tx.output[0].value + Amount::from_sat(value);

    let mut input = Input {
        witness_utxo: Some(prev_tx.output[0].clone()),
        ..Default::default()
    };
    input.bip32_derivation.insert(pk, (fp, path));
    inner.inputs.push(input);
    prev_tx
}
