//! Fuzz target: memory limit parsing.
//!
//! Accepted limits must survive a Display/parse round trip unchanged.
#![no_main]

use biocage_core::MemoryLimit;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(limit) = text.parse::<MemoryLimit>() {
        let reparsed: MemoryLimit = limit.to_string().parse().expect("displayed limit must parse");
        assert_eq!(reparsed, limit);
    }
});
