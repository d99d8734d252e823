//! `X-Hub-Signature` computation and verification.
//!
//! The header has the form `algorithm=hexdigest` where the digest is an HMAC
//! of the raw request body keyed with the subscription secret.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Checks `header` against the HMAC of `body` under `secret`.
///
/// Only `sha256` and `sha512` are accepted. The comparison is constant-time.
pub fn verify_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    let Some((algorithm, digest)) = header.trim().split_once('=') else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };

    match algorithm.to_ascii_lowercase().as_str() {
        "sha256" => Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false),
        "sha512" => Hmac::<Sha512>::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false),
        _ => false,
    }
}

/// Produces the `sha256=` header value the hub sends for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
