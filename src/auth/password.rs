//! bcrypt password hashing. Hashing is CPU-bound, so it runs on the blocking pool.

use thiserror::Error;

pub const BCRYPT_COST: u32 = 12;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("stored password hash is not valid UTF-8")]
    Encoding,
}

/// Hash at `cost`; production uses [`BCRYPT_COST`], tests something far cheaper.
pub async fn hash_password(plaintext: &str, cost: u32) -> Result<Vec<u8>, PasswordError> {
    let plaintext = plaintext.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
    Ok(hash.into_bytes())
}

pub async fn password_matches(plaintext: &str, hash: &[u8]) -> Result<bool, PasswordError> {
    let hash = std::str::from_utf8(hash)
        .map_err(|_| PasswordError::Encoding)?
        .to_owned();
    let plaintext = plaintext.to_owned();
    let matched = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await??;
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verifies_own_hash() {
        let hash = hash_password("pa55word", 4).await.unwrap();
        assert!(password_matches("pa55word", &hash).await.unwrap());
        assert!(!password_matches("wrong-password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_garbage_hash() {
        assert!(password_matches("pa55word", &[0xff, 0xfe]).await.is_err());
    }
}
