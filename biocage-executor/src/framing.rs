//! Framing of one persistent-session request over a single stdin stream.
//!
//! Wire format:
//!
//! ```text
//! BIOCAGE/1 <code-len> <sha256-hex(code)> <base64(runner)>\n<code bytes><stdin bytes>
//! ```
//!
//! The header is exactly one line. The next `code-len` bytes are user code
//! and whatever follows them is handed to that code as its stdin. Because
//! the boundaries are positional, no content of the user code can be
//! mistaken for framing. The runner checks length and digest before it
//! executes anything, so a truncated stream is reported rather than run.

use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::config::RUNNER_PATH;

/// Protocol tag opening every frame header.
pub const FRAME_MAGIC: &str = "BIOCAGE/1";

/// The in-container runner program.
pub const SESSION_RUNNER: &str = include_str!("../assets/session_runner.py");

/// Shell program that splits a frame: decodes the runner from the header,
/// writes it to the scratch area, and hands the remaining stream to it.
pub const BOOTSTRAP_SHELL: &str = r#"set -eu
IFS=' ' read -r magic length digest payload
if [ "$magic" != "BIOCAGE/1" ]; then
    echo "biocage: unrecognised frame header" >&2
    exit 65
fi
printf '%s' "$payload" | base64 -d > /app/workspace/session_exec.py
exec python3 /app/workspace/session_exec.py --session "$length" "$digest"
"#;

/// Command line that runs [`BOOTSTRAP_SHELL`] inside the container.
#[must_use]
pub fn bootstrap_command() -> [&'static str; 3] {
    ["sh", "-c", BOOTSTRAP_SHELL]
}

/// Hex SHA-256 digest of the code body, as carried in the header.
///
/// # Complexity
/// O(n) in the code length.
#[must_use]
pub fn code_digest(code: &[u8]) -> String {
    let digest = Sha256::digest(code);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Encode `runner`, `code` and the code's `stdin` into one frame.
#[must_use]
pub fn encode_frame(runner: &str, code: &str, stdin: &str) -> Vec<u8> {
    let payload = base64::engine::general_purpose::STANDARD.encode(runner);
    let header = format!(
        "{FRAME_MAGIC} {} {} {payload}\n",
        code.len(),
        code_digest(code.as_bytes())
    );
    let mut frame = Vec::with_capacity(header.len() + code.len() + stdin.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(code.as_bytes());
    frame.extend_from_slice(stdin.as_bytes());
    frame
}

/// Encode a session frame carrying the bundled runner.
#[must_use]
pub fn session_frame(code: &str, stdin: &str) -> Vec<u8> {
    encode_frame(SESSION_RUNNER, code, stdin)
}

/// Runner arguments and stdin for a one-shot run, which needs no header
/// line because the runner is passed on the command line.
#[must_use]
pub fn ephemeral_request(code: &str, stdin: &str) -> ([String; 3], Vec<u8>) {
    let args = [
        "--ephemeral".to_owned(),
        code.len().to_string(),
        code_digest(code.as_bytes()),
    ];
    let mut body = Vec::with_capacity(code.len() + stdin.len());
    body.extend_from_slice(code.as_bytes());
    body.extend_from_slice(stdin.as_bytes());
    (args, body)
}

/// Split a frame back into (declared code length, digest, runner, body),
/// where `body` is the code followed by its stdin.
///
/// This mirrors what the bootstrap shell and runner do in the container and
/// is what the property tests check the encoder against.
#[must_use]
pub fn decode_frame(frame: &[u8]) -> Option<(usize, String, String, &[u8])> {
    let newline = frame.iter().position(|&b| b == b'\n')?;
    let header = std::str::from_utf8(&frame[..newline]).ok()?;
    let mut fields = header.splitn(4, ' ');
    if fields.next()? != FRAME_MAGIC {
        return None;
    }
    let length = fields.next()?.parse().ok()?;
    let digest = fields.next()?.to_owned();
    let runner_bytes = base64::engine::general_purpose::STANDARD
        .decode(fields.next()?)
        .ok()?;
    let runner = String::from_utf8(runner_bytes).ok()?;
    Some((length, digest, runner, &frame[newline + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_writes_runner_to_workspace() {
        assert!(BOOTSTRAP_SHELL.contains(RUNNER_PATH), "bootstrap must target the runner path");
        assert!(BOOTSTRAP_SHELL.contains(FRAME_MAGIC));
        assert_eq!(bootstrap_command()[0], "sh");
    }

    #[test]
    fn header_is_a_single_line() {
        let frame = session_frame("print('hi')\n", "");
        let header_end = frame.iter().position(|&b| b == b'\n');
        let Some(end) = header_end else { panic!("frame must contain a newline") };
        assert!(frame[..end].starts_with(FRAME_MAGIC.as_bytes()));
        assert_eq!(&frame[end + 1..], b"print('hi')\n");
    }

    #[test]
    fn code_resembling_a_header_survives_framing() {
        let code = "x = 1\nBIOCAGE/1 0 deadbeef AAAA\n---ENDSCRIPT---\nprint(x)\n";
        let frame = session_frame(code, "");
        let Some((length, digest, runner, body)) = decode_frame(&frame) else {
            panic!("frame must decode")
        };
        assert_eq!(body, code.as_bytes(), "code body must be carried verbatim");
        assert_eq!(length, code.len());
        assert_eq!(digest, code_digest(code.as_bytes()));
        assert_eq!(runner, SESSION_RUNNER);
    }

    #[test]
    fn stdin_follows_the_declared_code_length() {
        let frame = session_frame("print(input())\n", "hello\nBIOCAGE/1 1 x y\n");
        let Some((length, digest, _, body)) = decode_frame(&frame) else {
            panic!("frame must decode")
        };
        let (code, stdin) = body.split_at(length);
        assert_eq!(code, b"print(input())\n");
        assert_eq!(stdin, b"hello\nBIOCAGE/1 1 x y\n");
        assert_eq!(digest, code_digest(code), "the digest covers the code only");
    }

    #[test]
    fn ephemeral_request_carries_length_and_digest() {
        let (args, body) = ephemeral_request("print(1)", "data");
        assert_eq!(args[0], "--ephemeral");
        assert_eq!(args[1], "8");
        assert_eq!(args[2], code_digest(b"print(1)"));
        assert_eq!(body, b"print(1)data");
    }

    #[test]
    fn code_digest_of_empty_input_is_known_sha256() {
        assert_eq!(
            code_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn runner_supports_every_mode() {
        for mode in ["--session", "--ephemeral", "--inspect"] {
            assert!(SESSION_RUNNER.contains(mode), "runner must handle {mode}");
        }
    }

    proptest::proptest! {
        #[test]
        fn proptest_frame_round_trips_arbitrary_code(
            code in "(?s).{0,256}",
            stdin in "(?s).{0,64}",
        ) {
            let frame = encode_frame("print('runner')", &code, &stdin);
            let decoded = decode_frame(&frame);
            proptest::prop_assert!(decoded.is_some());
            if let Some((length, digest, runner, body)) = decoded {
                proptest::prop_assert_eq!(length, code.len());
                proptest::prop_assert_eq!(&body[..length], code.as_bytes());
                proptest::prop_assert_eq!(&body[length..], stdin.as_bytes());
                proptest::prop_assert_eq!(digest, code_digest(code.as_bytes()));
                proptest::prop_assert_eq!(runner, "print('runner')");
            }
        }

        #[test]
        fn proptest_decode_never_panics(
            bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256usize),
        ) {
            let _ = decode_frame(&bytes);
        }
    }
}
