#![no_main]

use libfuzzer_sys::fuzz_target;
use mcproto::core::frame::FrameReader;

fuzz_target!(|data: &[u8]| {
    // Arbitrary socket input cut into uneven reads must never panic
    let mut reader = FrameReader::new(4096);
    for chunk in data.chunks(7) {
        if reader.feed(chunk).is_err() {
            break;
        }
    }
});
