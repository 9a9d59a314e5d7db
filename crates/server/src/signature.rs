use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Missing,
    Invalid,
}

/// Checks an `x-signature` header against HMAC-SHA256 of the raw body.
///
/// Accepts a bare hex digest or a comma separated list of `key=value` pairs
/// carrying the digest under `v1` or `sha256`.
pub fn verify(secret: &SecretString, header: Option<&str>, body: &[u8]) -> SignatureCheck {
    let Some(header) = header.map(str::trim).filter(|value| !value.is_empty()) else {
        return SignatureCheck::Missing;
    };
    let Some(digest) = digest_from_header(header).and_then(decode_hex) else {
        return SignatureCheck::Invalid;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return SignatureCheck::Invalid;
    };
    mac.update(body);
    match mac.verify_slice(&digest) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid,
    }
}

pub fn sign(secret: &SecretString, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn digest_from_header(header: &str) -> Option<&str> {
    if !header.contains('=') {
        return Some(header);
    }
    header.split(',').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        matches!(key.trim(), "v1" | "sha256").then(|| value.trim())
    })
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(text.get(index..index + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
