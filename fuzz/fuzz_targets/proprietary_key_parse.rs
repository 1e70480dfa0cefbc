#![no_main]

use libfuzzer_sys::fuzz_target;
use tapsig_psbt::{
    decode_proprietary_key, decode_psbt_musig2_participants, decode_psbt_musig2_pub_nonce,
    encode_proprietary_key, ProprietaryKeyValue,
};

fuzz_target!(|data: &[u8]| {
    let Some((split, data)) = data.split_first() else {
        return;
    };
    let (key, value) = data.split_at(usize::from(*split).min(data.len()));

    if let Ok(decoded) = decode_proprietary_key(key) {
        assert_eq!(encode_proprietary_key(&decoded), key);
        let kv = ProprietaryKeyValue {
            key: decoded,
            value: value.to_vec(),
        };
        let _ = decode_psbt_musig2_participants(&kv);
        let _ = decode_psbt_musig2_pub_nonce(&kv);
    }
});
