//! In-process stores backing `--in-memory` mode and the test-suite.
//!
//! Every call goes through the same timeout wrapper as the Postgres stores, and an
//! optional injected latency lets callers observe the timeout path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::auth::token::{generate_token, hash_plaintext, Scope, Token, TokenError};
use crate::database::models::{Movie, Permissions, User};
use crate::database::store::{
    with_timeout, MovieStore, PermissionStore, StoreError, TokenStore, UserStore,
};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// What a stored token keeps: the digest, never the plaintext.
#[derive(Debug, Clone)]
struct TokenRow {
    hash: [u8; 32],
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

impl From<&Token> for TokenRow {
    fn from(token: &Token) -> Self {
        Self {
            hash: token.hash,
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<i64, User>,
    tokens: Vec<TokenRow>,
    permissions: HashMap<i64, Vec<String>>,
    movies: HashMap<i64, Movie>,
    next_user_id: i64,
    next_movie_id: i64,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    query_timeout: Duration,
    latency: Mutex<Option<Duration>>,
    token_lookups: AtomicUsize,
    permission_lookups: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_query_timeout(DEFAULT_QUERY_TIMEOUT)
    }

    pub fn with_query_timeout(query_timeout: Duration) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            query_timeout,
            latency: Mutex::new(None),
            token_lookups: AtomicUsize::new(0),
            permission_lookups: AtomicUsize::new(0),
        }
    }

    /// Delay every subsequent call by `latency`; `None` clears it.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Number of token-to-user resolutions attempted so far.
    pub fn token_lookups(&self) -> usize {
        self.token_lookups.load(Ordering::SeqCst)
    }

    pub fn permission_lookups(&self) -> usize {
        self.permission_lookups.load(Ordering::SeqCst)
    }

    /// Insert a user directly, bypassing the async API. Returns the stored copy.
    pub fn seed_user(&self, mut user: User) -> Result<User, StoreError> {
        let mut tables = self.tables();
        insert_user(&mut tables, &mut user)?;
        Ok(user)
    }

    pub fn grant(&self, user_id: i64, codes: &[&str]) {
        let mut tables = self.tables();
        let held = tables.permissions.entry(user_id).or_default();
        for code in codes {
            if !held.iter().any(|c| c == code) {
                held.push(code.to_string());
            }
        }
    }

    /// Mint and store a token. A negative `ttl` yields an already-expired one.
    pub fn issue_token(
        &self,
        user_id: i64,
        scope: Scope,
        ttl: chrono::Duration,
    ) -> Result<Token, TokenError> {
        let token = generate_token(user_id, ttl, scope)?;
        self.tables().insert_token(&token);
        Ok(token)
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.tables().users.get(&id).cloned()
    }

    pub fn token_count(&self, user_id: i64, scope: Scope) -> usize {
        self.tables()
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.scope == scope)
            .count()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against the tables under the store's timeout and injected latency.
    async fn call<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send,
    {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        with_timeout(self.query_timeout, async {
            if let Some(delay) = latency {
                tokio::time::sleep(delay).await;
            }
            let mut tables = self.tables();
            op(&mut tables)
        })
        .await
    }
}

impl Tables {
    /// Store the digest of `token`, dropping rows that have already expired.
    fn insert_token(&mut self, token: &Token) {
        let now = Utc::now();
        self.tokens.retain(|row| row.expiry > now);
        self.tokens.push(TokenRow::from(token));
    }
}

fn insert_user(tables: &mut Tables, user: &mut User) -> Result<(), StoreError> {
    if tables.users.values().any(|u| u.email == user.email) {
        return Err(StoreError::DuplicateEmail);
    }
    tables.next_user_id += 1;
    user.id = tables.next_user_id;
    user.created_at = Utc::now();
    user.version = 1;
    tables.users.insert(user.id, user.clone());
    Ok(())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        self.call(|tables| insert_user(tables, user)).await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.call(|tables| {
            tables
                .users
                .values()
                .find(|u| u.email == email)
                .cloned()
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        self.call(|tables| {
            if tables
                .users
                .values()
                .any(|u| u.id != user.id && u.email == user.email)
            {
                return Err(StoreError::DuplicateEmail);
            }
            let stored = tables
                .users
                .get_mut(&user.id)
                .filter(|stored| stored.version == user.version)
                .ok_or(StoreError::EditConflict)?;
            user.version += 1;
            *stored = user.clone();
            Ok(())
        })
        .await
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError> {
        self.token_lookups.fetch_add(1, Ordering::SeqCst);
        let hash = hash_plaintext(plaintext);
        self.call(|tables| {
            let now = Utc::now();
            let token = tables
                .tokens
                .iter()
                .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
                .ok_or(StoreError::NotFound)?;
            tables
                .users
                .get(&token.user_id)
                .cloned()
                .ok_or(StoreError::NotFound)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        self.call(|tables| {
            tables.insert_token(token);
            Ok(())
        })
        .await
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        self.call(|tables| {
            tables
                .tokens
                .retain(|t| !(t.scope == scope && t.user_id == user_id));
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        self.call(|tables| {
            Ok(Permissions(
                tables.permissions.get(&user_id).cloned().unwrap_or_default(),
            ))
        })
        .await
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        self.call(|tables| {
            let held = tables.permissions.entry(user_id).or_default();
            for code in codes {
                if !held.iter().any(|c| c == code) {
                    held.push(code.to_string());
                }
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        self.call(|tables| {
            tables.next_movie_id += 1;
            movie.id = tables.next_movie_id;
            movie.created_at = Utc::now();
            movie.version = 1;
            tables.movies.insert(movie.id, movie.clone());
            Ok(())
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.call(|tables| tables.movies.get(&id).cloned().ok_or(StoreError::NotFound))
            .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.call(|tables| {
            tables
                .movies
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound)
        })
        .await
    }
}
