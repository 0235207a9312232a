use chrono::{TimeZone, Utc};
use getrandom::fill;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const OTP_DIGITS: usize = 6;
const RESET_TOKEN_LEN: usize = 48;
const ALPHANUMERIC: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

pub fn ts_to_rfc3339(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    fill(&mut out).map_err(|e| Error::Internal(format!("OS randomness unavailable: {e}")))?;
    Ok(out)
}

pub fn hex_encode(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(LUT[(b >> 4) as usize] as char);
        out.push(LUT[(b & 0x0f) as usize] as char);
    }
    out
}

pub fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

/// 128-bit random id, hex-encoded.
pub fn new_id() -> Result<String> {
    Ok(hex_encode(&random_bytes(16)?))
}

pub fn sha256_hex(value: &str) -> String {
    hex_encode(&Sha256::digest(value.as_bytes()))
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Six decimal digits for manual entry.
pub fn generate_otp_code() -> Result<String> {
    // Largest multiple of 10^6 below u32::MAX; draws above it are rejected so
    // every code is equally likely.
    const LIMIT: u32 = 4_294_000_000;
    loop {
        let b = random_bytes(4)?;
        let n = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        if n < LIMIT {
            return Ok(format!("{:0width$}", n % 1_000_000, width = OTP_DIGITS));
        }
    }
}

/// Long opaque alphanumeric token, not meant to be typed.
pub fn generate_reset_token() -> Result<String> {
    // 248 = 4 * 62.
    let mut out = String::with_capacity(RESET_TOKEN_LEN);
    while out.len() < RESET_TOKEN_LEN {
        for b in random_bytes(RESET_TOKEN_LEN)? {
            if b < 248 && out.len() < RESET_TOKEN_LEN {
                out.push(ALPHANUMERIC[(b % 62) as usize] as char);
            }
        }
    }
    Ok(out)
}
