use base64::prelude::*;
use sha2::{Digest, Sha256};

fn sha256_b64(input: &str) -> String {
    BASE64_STANDARD.encode(Sha256::digest(input.as_bytes()))
}

/// Builds the Identify authentication string for a Hello challenge.
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn create_auth_string(password: &str, salt: &str, challenge: &str) -> String {
    let secret = sha256_b64(&format!("{password}{salt}"));
    sha256_b64(&format!("{secret}{challenge}"))
}
