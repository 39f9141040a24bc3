// handlers/users.rs - account registration and activation

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use crate::auth::token::validate_token_plaintext;
use crate::auth::{hash_password, Scope};
use crate::database::models::user::validate_user;
use crate::database::models::User;
use crate::database::StoreError;
use crate::error::ApiError;
use crate::handlers::JsonBody;
use crate::mailer::EmailMessage;
use crate::middleware::{ApiResult, Envelope};
use crate::state::AppState;
use crate::validator::Validator;

/// Every new account may read the catalog.
const DEFAULT_PERMISSIONS: &[&str] = &["movies:read"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/**
 * POST /v1/users - Create an inactive account
 *
 * Grants the default permissions, issues an activation token and mails it to
 * the new user in the background. Responds 202 because the email is still in
 * flight when the response is written.
 */
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> ApiResult {
    let mut v = Validator::new();
    validate_user(&mut v, &input.name, &input.email, &input.password);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let password_hash = hash_password(&input.password, state.config.security.bcrypt_cost).await?;
    let mut user = User::new(input.name, input.email, password_hash);
    state.users.insert(&mut user).await?;

    state
        .permissions
        .add_for_user(user.id, DEFAULT_PERMISSIONS)
        .await?;

    let token = state
        .tokens
        .new_token(user.id, state.config.tokens.activation_ttl(), Scope::Activation)
        .await?;

    let mailer = state.mailer.clone();
    let message = EmailMessage {
        recipient: user.email.clone(),
        template: "user_welcome".to_string(),
        data: json!({
            "activationToken": token.plaintext,
            "userID": user.id,
        }),
    };
    state
        .background
        .spawn("welcome-email", async move { mailer.send(message).await });

    tracing::info!(user_id = user.id, "registered user");
    Ok(Envelope::new("user", &user).accepted())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateInput {
    #[serde(default)]
    pub token: String,
}

/// PUT /v1/users/activated - Trade an activation token for an activated account
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateInput>,
) -> ApiResult {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let mut user = match state
        .users
        .get_for_token(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            v.add_error("token", "invalid or expired activation token");
            return Err(ApiError::failed_validation(v.into_errors()));
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    state.users.update(&mut user).await?;

    state
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    Ok(Envelope::new("user", &user))
}
