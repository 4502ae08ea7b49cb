#![no_main]

use libfuzzer_sys::fuzz_target;
use zenavif_grid::DecoderConfig;

fuzz_target!(|data: &[u8]| {
    let config = DecoderConfig::new().frame_size_limit(4096 * 4096);
    let _ = zenavif_grid::decode_with(data, &config);
});
