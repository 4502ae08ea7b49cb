#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(info) = zenavif_grid::probe(data) {
        assert!(info.width > 0 && info.height > 0);
    }
});
