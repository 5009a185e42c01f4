// Error taxonomy for the match and token lifecycle.

use axum::http::StatusCode;

use crate::db::MatchStatus;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Bad input shape or enum value. Raised before any write.
    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Token is not active")]
    TokenInactive,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token was already redeemed by another player")]
    TokenAlreadyRedeemed,

    #[error("Failed to generate a unique token after {attempts} attempts")]
    TokenGenerationExhausted { attempts: u32 },

    #[error("{0} matches are currently disabled")]
    ModeDisabled(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: MatchStatus, to: MatchStatus },

    #[error("{0}")]
    RateLimited(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl MatchError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotAuthenticated => "not_authenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::TokenInactive => "token_inactive",
            Self::TokenExpired => "token_expired",
            Self::TokenAlreadyRedeemed => "token_already_redeemed",
            Self::TokenGenerationExhausted { .. } => "token_generation_exhausted",
            Self::ModeDisabled(_) => "mode_disabled",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::RateLimited(_) => "rate_limited",
            Self::Persistence(_) => "persistence_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::ModeDisabled(_) | Self::TokenInactive => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TokenExpired => StatusCode::GONE,
            Self::TokenAlreadyRedeemed | Self::InvalidStatusTransition { .. } => {
                StatusCode::CONFLICT
            }
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::TokenGenerationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors whose text describes server internals rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::TokenGenerationExhausted { .. }
        )
    }
}
