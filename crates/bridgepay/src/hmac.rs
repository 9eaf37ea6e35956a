use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::security::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the given body bytes using the signing secret.
/// Returns the MAC hex-encoded in uppercase, the form the provider sends.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode_upper(mac.finalize().into_bytes())
}

/// Check a received hex digest against the signature of `body`.
///
/// The digest must be uppercase hex, as the provider sends it. Constant-time
/// on the comparison.
pub fn verify_signature(secret: &[u8], body: &[u8], digest: &str) -> bool {
    let expected = compute_signature(secret, body);
    constant_time_eq(expected.as_bytes(), digest.as_bytes())
}

mod hex {
    pub fn encode_upper(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02X}");
            s
        })
    }
}
