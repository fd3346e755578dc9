//! Fuzz target: runner output parser.
//!
//! Arbitrary stdout/stderr must always yield a result, never a panic, and
//! a successful result must carry exit code 0 and no error.
#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let (stdout, stderr) = text.split_once('\0').unwrap_or((&text, ""));
    let exit_code = data.first().map(|b| i32::from(*b) - 128);
    let elapsed = Duration::from_millis(5);
    let result = biocage_executor::parse_runner_output(stdout, stderr, exit_code, elapsed);
    if result.success() {
        assert_eq!(result.exit_code(), 0);
        assert!(result.error().is_none());
    }
});
