#![no_main]

use libfuzzer_sys::fuzz_target;
use rpa_decoder::Decoder;
use rpa_decoder::command_handler::NullCommandHandler;
use rpa_decoder::emit::NullEmitter;

fuzz_target!(|data: &[u8]| {
    let mut decoder = Decoder::new();
    let mut out = NullEmitter;
    let mut handler = NullCommandHandler;

    // Treat the input as alternating host/reply pseudo-packets so every
    // state, including the reply chains, is reachable.
    for (index, chunk) in data.chunks(8).enumerate() {
        let is_reply = index % 2 == 1;
        for (offset, byte) in chunk.iter().enumerate() {
            let remaining = chunk.len() - 1 - offset;
            let _ = decoder.step(*byte, is_reply, remaining, &mut out, &mut handler);
        }
    }
});
