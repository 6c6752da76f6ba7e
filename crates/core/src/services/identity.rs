//! Voter identity service.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use neighborly_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Prefix marking guest voter ids.
pub const GUEST_PREFIX: &str = "guest:";

const MIN_DEVICE_TOKEN_LEN: usize = 16;
const MAX_DEVICE_TOKEN_LEN: usize = 128;
/// Member ids are stored in `varchar(128)` columns.
pub const MAX_SUBJECT_LEN: usize = 128;

/// The caller a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Voter {
    /// A signed-in member.
    Member { id: String },
    /// An unauthenticated caller identified by a device token.
    Guest { device_token: String },
}

impl Voter {
    /// Stable voter id used for duplicate prevention.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Member { id } => id.clone(),
            Self::Guest { device_token } => format!("{GUEST_PREFIX}{device_token}"),
        }
    }

    /// Whether the voter is a signed-in member.
    #[must_use]
    pub const fn is_member(&self) -> bool {
        matches!(self, Self::Member { .. })
    }
}

/// Bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (member id).
    pub sub: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

/// Resolves callers into voters.
#[derive(Clone)]
pub struct IdentityService {
    decoding_key: DecodingKey,
    validation: Validation,
    allow_guests: bool,
}

impl IdentityService {
    /// Create a new identity service verifying HS256 tokens with `secret`.
    #[must_use]
    pub fn new(secret: &str, allow_guests: bool) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            allow_guests,
        }
    }

    /// Whether guest voting is enabled.
    #[must_use]
    pub const fn allows_guests(&self) -> bool {
        self.allow_guests
    }

    /// Verify a bearer token and return the member it names.
    pub fn authenticate_bearer(&self, token: &str) -> AppResult<Voter> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized
        })?;

        let sub = &data.claims.sub;
        if sub.is_empty() || sub.chars().count() > MAX_SUBJECT_LEN || sub.starts_with(GUEST_PREFIX)
        {
            tracing::debug!(len = sub.len(), "Rejected bearer subject");
            return Err(AppError::Unauthorized);
        }

        Ok(Voter::Member {
            id: data.claims.sub,
        })
    }

    /// Resolve a guest voter from a device token.
    pub fn guest(&self, device_token: &str) -> AppResult<Voter> {
        if !self.allow_guests {
            return Err(AppError::Unauthorized);
        }

        let token = device_token.trim();
        if token.len() < MIN_DEVICE_TOKEN_LEN || token.len() > MAX_DEVICE_TOKEN_LEN {
            return Err(AppError::BadRequest(format!(
                "Device token must be {MIN_DEVICE_TOKEN_LEN}-{MAX_DEVICE_TOKEN_LEN} characters"
            )));
        }
        if !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::BadRequest(
                "Device token contains invalid characters".to_string(),
            ));
        }

        Ok(Voter::Guest {
            device_token: token.to_string(),
        })
    }
}
