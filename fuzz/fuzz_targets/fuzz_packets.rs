#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use mcproto::protocol::packets::table_for;
use mcproto::protocol::ConnectionState;

fuzz_target!(|data: &[u8]| {
    // First byte picks the state, second the packet id, the rest is payload
    if data.len() < 2 {
        return;
    }
    let state = match data[0] % 4 {
        0 => ConnectionState::Handshaking,
        1 => ConnectionState::Status,
        2 => ConnectionState::Login,
        _ => ConnectionState::Play,
    };
    if let Ok(spec) = table_for(340).lookup(state, i32::from(data[1] & 0x3F)) {
        let _ = spec.decode(Bytes::copy_from_slice(&data[2..]));
    }
});
