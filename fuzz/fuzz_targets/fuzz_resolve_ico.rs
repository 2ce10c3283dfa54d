#![no_main]

use libfuzzer_sys::fuzz_target;
use zensniff::{DecodeConfig, ImageType};

fuzz_target!(|data: &[u8]| {
    let config = DecodeConfig::default().with_peak_memory_limit(1_000_000);
    let _ = zensniff::resolve_ico_with_config(data, |format| format != ImageType::Svg, &config, &enough::Unstoppable);
});
