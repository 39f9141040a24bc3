//! Authorization checks layered on top of the resolved [`Identity`].
//!
//! Each check calls the weaker one first, so a permission lookup never runs for an
//! anonymous or inactive caller.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::auth::Identity;
use crate::database::models::User;
use crate::database::PermissionStore;
use crate::error::ApiError;

pub fn authenticated_user(identity: &Identity) -> Result<&User, ApiError> {
    identity.user().ok_or(ApiError::AuthenticationRequired)
}

pub fn activated_user(identity: &Identity) -> Result<&User, ApiError> {
    let user = authenticated_user(identity)?;
    if !user.activated {
        debug!(user_id = user.id, "inactive account denied");
        return Err(ApiError::InactiveAccount);
    }
    Ok(user)
}

pub async fn permitted_user<'a>(
    permissions: &dyn PermissionStore,
    identity: &'a Identity,
    code: &str,
) -> Result<&'a User, ApiError> {
    let user = activated_user(identity)?;
    let held = permissions.get_all_for_user(user.id).await?;
    if !held.include(code) {
        debug!(user_id = user.id, permission = code, "permission denied");
        return Err(ApiError::NotPermitted);
    }
    Ok(user)
}

/// The authenticate middleware always runs first, so a missing identity is a wiring bug.
fn request_identity(request: &Request) -> Identity {
    match request.extensions().get::<Identity>() {
        Some(identity) => identity.clone(),
        None => panic!("no identity attached to request; authenticate middleware is not installed"),
    }
}

pub async fn require_authenticated_user(request: Request, next: Next) -> Result<Response, ApiError> {
    authenticated_user(&request_identity(&request))?;
    Ok(next.run(request).await)
}

pub async fn require_activated_user(request: Request, next: Next) -> Result<Response, ApiError> {
    activated_user(&request_identity(&request))?;
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: where to look permissions up and which code to demand.
#[derive(Clone)]
pub struct PermissionGate {
    pub permissions: Arc<dyn PermissionStore>,
    pub code: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn PermissionStore>, code: &'static str) -> Self {
        Self { permissions, code }
    }
}

pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request_identity(&request);
    permitted_user(gate.permissions.as_ref(), &identity, gate.code).await?;
    Ok(next.run(request).await)
}
