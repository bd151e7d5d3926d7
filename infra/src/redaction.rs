//! PII redaction for log lines and audit trails

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

const REDACTED: &str = "[REDACTED]";

lazy_static! {
    static ref PII_PATTERNS: Vec<Regex> = vec![
        // E-mail addresses
        Regex::new(r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+").expect("valid regex"),
        // Phone numbers
        Regex::new(r"\+?\d[\d\-\s]{6,}\d").expect("valid regex"),
        // Country-prefixed document numbers
        Regex::new(r"\b[A-Z]{2}\s*\d{8,}\b").expect("valid regex"),
    ];
}

/// Replace e-mail addresses, phone numbers and document numbers
pub fn redact_pii(text: &str) -> String {
    PII_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, pattern| {
            pattern.replace_all(&acc, REDACTED).into_owned()
        })
}

/// SHA-256 block size, in bytes
const BLOCK_SIZE: usize = 64;

/// HMAC-SHA256 (RFC 2104) of an identifier, hex encoded. Empty input stays empty.
pub fn hash_identifier(key: &str, value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let mut block = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        let digest = Sha256::digest(key.as_bytes());
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key.as_bytes());
    }

    let ipad: Vec<u8> = block.iter().map(|b| b ^ 0x36).collect();
    let opad: Vec<u8> = block.iter().map(|b| b ^ 0x5c).collect();

    let inner = Sha256::new()
        .chain_update(&ipad)
        .chain_update(value.as_bytes())
        .finalize();
    let outer = Sha256::new().chain_update(&opad).chain_update(inner).finalize();
    hex::encode(outer)
}
