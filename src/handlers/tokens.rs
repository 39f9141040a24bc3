// handlers/tokens.rs - /v1/tokens/authentication (login and logout)

use axum::extract::{Extension, State};
use serde::Deserialize;

use crate::auth::{password_matches, Identity, Scope};
use crate::database::StoreError;
use crate::error::ApiError;
use crate::handlers::JsonBody;
use crate::middleware::{authenticated_user, ApiResult, Envelope};
use crate::state::AppState;
use crate::validator::{validate_email, validate_password_plaintext, Validator};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST - exchange email and password for a bearer token.
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsInput>,
) -> ApiResult {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let user = match state.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !password_matches(&input.password, &user.password_hash).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .tokens
        .new_token(
            user.id,
            state.config.tokens.authentication_ttl(),
            Scope::Authentication,
        )
        .await?;

    Ok(Envelope::new("authentication_token", &token).created())
}

/// DELETE - revoke every authentication token held by the caller.
pub async fn delete_authentication_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult {
    let user = authenticated_user(&identity)?;
    state
        .tokens
        .delete_all_for_user(Scope::Authentication, user.id)
        .await?;

    Ok(Envelope::new("message", "authentication tokens revoked"))
}
