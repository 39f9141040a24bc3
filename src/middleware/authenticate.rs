//! Resolves the bearer token on each request into an [`Identity`].

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::auth::token::{is_well_formed, Scope};
use crate::auth::Identity;
use crate::database::{StoreError, UserStore};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let response = match resolve_identity(state.users.as_ref(), request.headers()).await {
        Ok(identity) => {
            if let Some(user_id) = identity.user_id() {
                tracing::Span::current().record("user_id", user_id);
            }
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };
    vary_on_authorization(response)
}

/// Anonymous when the header is absent; otherwise the header must carry a live
/// authentication-scope token.
pub async fn resolve_identity(
    users: &dyn UserStore,
    headers: &HeaderMap,
) -> Result<Identity, ApiError> {
    let value = match headers.get(header::AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(Identity::Anonymous),
    };

    let plaintext = bearer_token(value).ok_or(ApiError::InvalidAuthenticationToken)?;
    if !is_well_formed(plaintext) {
        debug!("rejected malformed bearer token");
        return Err(ApiError::InvalidAuthenticationToken);
    }

    match users.get_for_token(Scope::Authentication, plaintext).await {
        Ok(user) => Ok(Identity::User(user)),
        Err(StoreError::NotFound) => Err(ApiError::InvalidAuthenticationToken),
        Err(err) => Err(err.into()),
    }
}

/// `Bearer <token>` with exactly one separating space.
fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Some(*token),
        _ => None,
    }
}

fn vary_on_authorization(mut response: Response) -> Response {
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_parsing() {
        let ok = HeaderValue::from_static("Bearer Y3QMGX3PJ3WLRL2YRTQGQ6KRHU");
        assert_eq!(bearer_token(&ok), Some("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"));

        for bad in [
            "Basic Y3QMGX3PJ3WLRL2YRTQGQ6KRHU",
            "bearer Y3QMGX3PJ3WLRL2YRTQGQ6KRHU",
            "Bearer",
            "Bearer  Y3QMGX3PJ3WLRL2YRTQGQ6KRHU",
            "Bearer a b",
        ] {
            assert_eq!(bearer_token(&HeaderValue::from_static(bad)), None, "{bad}");
        }

        assert_eq!(bearer_token(&HeaderValue::from_static("Bearer ")), Some(""));
    }
}
