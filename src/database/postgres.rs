//! PostgreSQL stores. Each query runs under the configured per-call timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use crate::auth::token::{hash_plaintext, Scope, Token};
use crate::database::models::{Movie, Permissions, User};
use crate::database::store::{
    with_timeout, MovieStore, PermissionStore, StoreError, TokenStore, UserStore,
};

const USERS_EMAIL_KEY: &str = "users_email_key";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn not_found(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Database(other),
    }
}

fn duplicate_email(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some(USERS_EMAIL_KEY) => {
            StoreError::DuplicateEmail
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let (id, created_at, version): (i64, DateTime<Utc>, i32) =
            with_timeout(self.timeout, async {
                sqlx::query_as(
                    r#"
                    INSERT INTO users (name, email, password_hash, activated)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, created_at, version
                    "#,
                )
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .fetch_one(&self.pool)
                .await
                .map_err(duplicate_email)
            })
            .await?;

        user.id = id;
        user.created_at = created_at;
        user.version = version;
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, created_at, name, email, password_hash, activated, version
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found)
        })
        .await
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let version: i32 = with_timeout(self.timeout, async {
            sqlx::query_scalar(
                r#"
                UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::EditConflict,
                other => duplicate_email(other),
            })
        })
        .await?;

        user.version = version;
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError> {
        let hash = hash_plaintext(plaintext);
        with_timeout(self.timeout, async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT users.id, users.created_at, users.name, users.email,
                       users.password_hash, users.activated, users.version
                FROM users
                INNER JOIN tokens ON users.id = tokens.user_id
                WHERE tokens.hash = $1
                  AND tokens.scope = $2
                  AND tokens.expiry > $3
                "#,
            )
            .bind(&hash[..])
            .bind(scope.as_str())
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(not_found)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query(
                r#"
                INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&token.hash[..])
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let codes: Vec<String> = with_timeout(self.timeout, async {
            Ok(sqlx::query_scalar(
                r#"
                SELECT permissions.code
                FROM permissions
                INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                INNER JOIN users ON users_permissions.user_id = users.id
                WHERE users.id = $1
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
        })
        .await?;

        Ok(Permissions(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|code| code.to_string()).collect();
        with_timeout(self.timeout, async {
            sqlx::query(
                r#"
                INSERT INTO users_permissions
                SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                "#,
            )
            .bind(user_id)
            .bind(&codes)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl MovieStore for PgStore {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let (id, created_at, version): (i64, DateTime<Utc>, i32) =
            with_timeout(self.timeout, async {
                Ok(sqlx::query_as(
                    r#"
                    INSERT INTO movies (title, year, runtime, genres)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, created_at, version
                    "#,
                )
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(&movie.genres)
                .fetch_one(&self.pool)
                .await?)
            })
            .await?;

        movie.id = id;
        movie.created_at = created_at;
        movie.version = version;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        with_timeout(self.timeout, async {
            sqlx::query_as::<_, Movie>(
                r#"
                SELECT id, created_at, title, year, runtime, genres, version
                FROM movies
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let result = with_timeout(self.timeout, async {
            Ok(sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
