#![no_main]

use libfuzzer_sys::fuzz_target;
use zensniff::DecodeConfig;

fuzz_target!(|data: &[u8]| {
    let config = DecodeConfig::default().with_svg_sniff_limit(4096);
    let _ = zensniff::decode_meta_with_config(&mut &data[..], &config, &enough::Unstoppable);
});
