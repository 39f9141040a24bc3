//! Stateful bearer tokens.
//!
//! A token's plaintext is handed to the client once and never stored; only its
//! SHA-256 digest is persisted, so a stolen table cannot be replayed.

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::validator::Validator;

/// 16 random bytes encode to 26 base32 characters without padding.
pub const TOKEN_ENTROPY_BYTES: usize = 16;
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to read from the system random source: {0}")]
    Entropy(#[from] rand::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Create a fresh token for `user_id` that expires `ttl` from now.
pub fn generate_token(user_id: i64, ttl: chrono::Duration, scope: Scope) -> Result<Token, TokenError> {
    let mut random_bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut random_bytes)?;

    let plaintext = BASE32_NOPAD.encode(&random_bytes);
    let hash = hash_plaintext(&plaintext);

    Ok(Token {
        plaintext,
        hash,
        user_id,
        expiry: Utc::now() + ttl,
        scope,
    })
}

pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    let digest = Sha256::digest(plaintext.as_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// Shape check run before any store lookup.
pub fn is_well_formed(plaintext: &str) -> bool {
    !plaintext.is_empty() && plaintext.len() == TOKEN_PLAINTEXT_LEN
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_plaintext_is_26_base32_chars() {
        let token = generate_token(7, chrono::Duration::hours(1), Scope::Authentication).unwrap();
        assert_eq!(token.plaintext.len(), TOKEN_PLAINTEXT_LEN);
        assert!(token
            .plaintext
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert!(is_well_formed(&token.plaintext));
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert_eq!(token.user_id, 7);
        assert!(!token.is_expired_at(Utc::now()));
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate_token(1, chrono::Duration::hours(1), Scope::Activation).unwrap();
        let b = generate_token(1, chrono::Duration::hours(1), Scope::Activation).unwrap();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn known_hash() {
        // sha256("abc") = ba7816bf...
        assert_eq!(hash_plaintext("abc")[..4], [0xba, 0x78, 0x16, 0xbf]);
    }

    #[test]
    fn shape_check() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("Y3QMGX3PJ3WLRL2YRTQGQ6KRH"));
        assert!(is_well_formed("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"));
    }

    #[test]
    fn plaintext_never_serialized_as_hash() {
        let token = generate_token(1, chrono::Duration::hours(1), Scope::Authentication).unwrap();
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["token"], token.plaintext);
        assert!(json.get("hash").is_none());
        assert!(json.get("user_id").is_none());
        assert!(json.get("expiry").is_some());
    }

    #[test]
    fn scope_names() {
        assert_eq!(Scope::PasswordReset.as_str(), "password-reset");
        assert_eq!(
            serde_json::to_value(Scope::Authentication).unwrap(),
            "authentication"
        );
    }
}
