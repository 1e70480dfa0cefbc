#![no_main]

use libfuzzer_sys::fuzz_target;
use tapsig_core::parse_taproot_witness;

fuzz_target!(|data: &[u8]| {
    // Split the input into stack elements on a length prefix byte.
    let mut stack: Vec<&[u8]> = Vec::new();
    let mut rest = data;
    while let Some((len, tail)) = rest.split_first() {
        let len = usize::from(*len).min(tail.len());
        stack.push(&tail[..len]);
        rest = &tail[len..];
    }
    let _ = parse_taproot_witness(&stack);
});
