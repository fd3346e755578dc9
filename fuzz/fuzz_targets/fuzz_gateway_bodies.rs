//! Fuzz target: JSON deserialization of gateway request bodies.
//!
//! Errors are expected; panics are not.
#![no_main]

use biocage_gateway::routes::{CreateSandboxBody, EphemeralBody, ExecuteBody, ExposeBody};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<CreateSandboxBody>(data);
    let _ = serde_json::from_slice::<ExecuteBody>(data);
    let _ = serde_json::from_slice::<EphemeralBody>(data);
    let _ = serde_json::from_slice::<ExposeBody>(data);
});
