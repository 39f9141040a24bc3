//! Persistence seams used by the middleware and handlers.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::auth::token::{generate_token, Scope, Token, TokenError};
use crate::database::models::{Movie, Permissions, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("edit conflict")]
    EditConflict,

    /// A slow backend, distinct from an absent record.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Bound a store call; an elapsed deadline is a `Timeout`, never `NotFound`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Assigns `id`, `created_at` and `version` on success.
    async fn insert(&self, user: &mut User) -> Result<(), StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Optimistic update keyed on `version`; bumps it on success.
    async fn update(&self, user: &mut User) -> Result<(), StoreError>;

    /// Resolve the owner of a live token with the given scope.
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError>;

    async fn new_token(
        &self,
        user_id: i64,
        ttl: chrono::Duration,
        scope: Scope,
    ) -> Result<Token, StoreError> {
        let token = generate_token(user_id, ttl, scope)?;
        self.insert(&token).await?;
        Ok(token)
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError>;

    async fn get(&self, id: i64) -> Result<Movie, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_deadline_is_a_timeout() {
        let result: Result<(), StoreError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let result: Result<(), StoreError> =
            with_timeout(Duration::from_secs(1), async { Err(StoreError::NotFound) }).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
