#![no_main]

use libfuzzer_sys::fuzz_target;
use tapsig_core::ControlBlock;

fuzz_target!(|data: &[u8]| {
    // parse must never panic, and whatever it accepts must serialize back
    // to the same bytes.
    if let Ok(control_block) = ControlBlock::parse(data) {
        assert_eq!(control_block.serialize(), data);
    }
});
