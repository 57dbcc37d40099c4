#![no_main]

use libfuzzer_sys::fuzz_target;
use mapscope::translation::{MethodDescriptor, TypeDescriptor};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = TypeDescriptor::parse(text);
        let _ = MethodDescriptor::parse(text);
    }
});
