use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::error::AppError;
use crate::models::UserId;
use crate::AppState;

/// Authenticated caller, resolved from the `Authorization: Bearer` header.
///
/// Handlers that take this extractor reject unauthenticated requests
/// before any of their own code runs.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: UserId,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    if rejection.is_missing() {
                        AppError::MissingToken
                    } else {
                        AppError::TokenInvalid
                    }
                })?;

        let id = state.tokens.validate(bearer.token())?;
        Ok(CurrentUser { id })
    }
}
