#![no_main]

use libfuzzer_sys::fuzz_target;
use repatch::patch::detour::decode_transfer;
use repatch::runtime::address::CodeAddress;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[..8]);
    let from = CodeAddress::new(u64::from_le_bytes(raw));
    let _ = decode_transfer(from, &data[8..]);
});
