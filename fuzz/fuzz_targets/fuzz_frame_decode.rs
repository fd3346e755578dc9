//! Fuzz target: session frame codec.
//!
//! The decoder must not panic on arbitrary bytes, and any code body and
//! stdin must come back out of an encoded frame unchanged with a matching
//! header.
#![no_main]

use biocage_executor::framing::{code_digest, decode_frame, session_frame, SESSION_RUNNER};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_frame(data);

    let text = String::from_utf8_lossy(data);
    let (code, stdin) = text.split_once('\0').unwrap_or((&*text, ""));
    let frame = session_frame(code, stdin);
    let (len, digest, runner, body) = decode_frame(&frame).expect("encoded frame must decode");
    assert_eq!(len, code.len());
    assert_eq!(&body[..len], code.as_bytes());
    assert_eq!(&body[len..], stdin.as_bytes());
    assert_eq!(digest, code_digest(code.as_bytes()));
    assert_eq!(runner, SESSION_RUNNER);
});
