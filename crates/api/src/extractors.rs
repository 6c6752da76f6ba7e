//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use neighborly_common::AppError;
use neighborly_core::Voter;

/// Signed-in member extractor. Yields the member id.
#[derive(Debug, Clone)]
pub struct AuthMember(pub String);

impl<S> FromRequestParts<S> for AuthMember
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by auth middleware
        match parts.extensions.get::<Voter>() {
            Some(Voter::Member { id }) => Ok(Self(id.clone())),
            _ => Err(AppError::Unauthorized),
        }
    }
}

/// Member or guest extractor.
#[derive(Debug, Clone)]
pub struct AuthVoter(pub Voter);

impl<S> FromRequestParts<S> for AuthVoter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Voter>()
            .cloned()
            .map(AuthVoter)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional voter extractor.
#[derive(Debug, Clone)]
pub struct MaybeVoter(pub Option<Voter>);

impl<S> FromRequestParts<S> for MaybeVoter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Voter>().cloned()))
    }
}
