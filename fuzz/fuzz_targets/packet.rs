#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use mapscope::network::{ClientPacket, ServerPacket};

fuzz_target!(|data: &[u8]| {
    let _ = ClientPacket::read(&mut Cursor::new(data));
    let _ = ServerPacket::read(&mut Cursor::new(data));
});
