//! Stateless session tokens.
//!
//! A session token is a compact HS256 JWT carrying `{sub, iat, exp}`.
//! Verification needs only the shared key: no lookup, no revocation list.
//! A leaked token therefore stays valid until `exp`, which is why the TTL is
//! kept conservative.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::CoreConfig;
use crate::error::{Error, Result, TokenError};
use crate::util::now_ts;

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<[u8]>,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(&config.signing_key, config.session_ttl)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn issue(&self, subject: &str) -> Result<IssuedToken> {
        self.issue_at(subject, now_ts())
    }

    /// Same inputs always produce the same token.
    pub fn issue_at(&self, subject: &str, now: i64) -> Result<IssuedToken> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        let token = encode_hs256(&self.secret, &claims)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, now_ts())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        let claims: SessionClaims = decode_hs256(&self.secret, token)?;
        if claims.sub.trim().is_empty() || claims.iat > claims.exp {
            return Err(TokenError::Invalid);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn b64url_decode(s: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(s.as_bytes())
        .map_err(|_| TokenError::Invalid)
}

fn mac_for(secret: &[u8], signing_input: &str) -> Result<Hmac<Sha256>, TokenError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| TokenError::Invalid)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

fn encode_hs256<T: Serialize>(secret: &[u8], claims: &T) -> Result<String> {
    let header = JwtHeader {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| Error::Internal(format!("Failed to serialize JWT header: {e}")))?;
    let claims_json = serde_json::to_vec(claims)
        .map_err(|e| Error::Internal(format!("Failed to serialize JWT claims: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        b64url_encode(&header_json),
        b64url_encode(&claims_json)
    );

    let signature = mac_for(secret, &signing_input)?.finalize().into_bytes();
    Ok(format!("{signing_input}.{}", b64url_encode(&signature)))
}

/// Check the signature, then parse the payload.
fn decode_hs256<T: DeserializeOwned>(secret: &[u8], token: &str) -> Result<T, TokenError> {
    let token = token.trim();
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Invalid);
    };

    let header: JwtHeader =
        serde_json::from_slice(&b64url_decode(header_b64)?).map_err(|_| TokenError::Invalid)?;
    if header.alg != "HS256" || !header.typ.eq_ignore_ascii_case("JWT") {
        return Err(TokenError::Invalid);
    }

    let sig = b64url_decode(sig_b64)?;
    mac_for(secret, &format!("{header_b64}.{payload_b64}"))?
        .verify_slice(&sig)
        .map_err(|_| TokenError::Invalid)?;

    serde_json::from_slice(&b64url_decode(payload_b64)?).map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const T0: i64 = 1_760_000_000;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(KEY, Duration::from_secs(24 * 60 * 60))
    }

    #[test]
    fn verifies_and_recovers_subject_before_expiry() {
        let issued = issuer().issue_at("user-1", T0).unwrap();
        assert_eq!(issued.expires_at, T0 + 86_400);

        let claims = issuer().verify_at(&issued.token, T0 + 86_399).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.iat, T0);
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let issued = issuer().issue_at("user-1", T0).unwrap();
        assert_eq!(
            issuer().verify_at(&issued.token, T0 + 86_400),
            Err(TokenError::Expired)
        );
        assert_eq!(
            issuer().verify_at(&issued.token, T0 + 10 * 86_400),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn issuing_is_deterministic() {
        let a = issuer().issue_at("user-1", T0).unwrap();
        let b = issuer().issue_at("user-1", T0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let issued = issuer().issue_at("user-1", T0).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        let forged = SessionClaims {
            sub: "admin-1".to_string(),
            iat: T0,
            exp: T0 + 86_400,
        };
        let forged_payload = b64url_encode(&serde_json::to_vec(&forged).unwrap());
        let token = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(issuer().verify_at(&token, T0), Err(TokenError::Invalid));
    }

    #[test]
    fn tampering_beats_expiry() {
        // A forged token is Invalid even when its claimed expiry is in the past.
        let issued = issuer().issue_at("user-1", T0).unwrap();
        let mut token = issued.token.clone();
        token.push('A');
        assert_eq!(
            issuer().verify_at(&token, T0 + 100 * 86_400),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn wrong_key_and_malformed_tokens_are_invalid() {
        let issued = issuer().issue_at("user-1", T0).unwrap();
        let other = TokenIssuer::new(b"another-key-another-key-another!!", Duration::from_secs(60));
        assert_eq!(other.verify_at(&issued.token, T0), Err(TokenError::Invalid));

        for bad in ["", "abc", "a.b", "a.b.c.d", "..", "not.a.jwt"] {
            assert_eq!(issuer().verify_at(bad, T0), Err(TokenError::Invalid), "{bad}");
        }
    }

    #[test]
    fn missing_subject_is_invalid() {
        #[derive(Serialize)]
        struct NoSub {
            iat: i64,
            exp: i64,
        }
        let token = encode_hs256(KEY, &NoSub { iat: T0, exp: T0 + 60 }).unwrap();
        assert_eq!(issuer().verify_at(&token, T0), Err(TokenError::Invalid));

        let blank = SessionClaims {
            sub: " ".to_string(),
            iat: T0,
            exp: T0 + 60,
        };
        let token = encode_hs256(KEY, &blank).unwrap();
        assert_eq!(issuer().verify_at(&token, T0), Err(TokenError::Invalid));
    }
}
