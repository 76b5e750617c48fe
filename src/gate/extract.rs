//! axum extractors over the gate's request handle.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::context::RequestHandle;
use crate::auth::AuthenticatedUser;
use crate::gate::middleware::GateRejection;

/// The authenticated user; rejects with 401 when the context is empty.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<AuthenticatedUser>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        RequestHandle::from_extensions(&parts.extensions)
            .and_then(|handle| handle.try_current_user())
            .map(CurrentUser)
            .ok_or(GateRejection::Unauthorized)
    }
}

/// The authenticated user if there is one. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Arc<AuthenticatedUser>>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            RequestHandle::from_extensions(&parts.extensions)
                .and_then(|handle| handle.try_current_user()),
        ))
    }
}
