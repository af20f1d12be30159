//! Error types for reconciliation.

use chrono::{DateTime, Utc};
use thiserror::Error;
use validator::ValidationErrors;

use crate::model::{CartToken, ShopDomain, TransactionStatus};
use crate::provider::ProviderError;
use crate::store::StoreError;

/// Error returned by [`Engine`](super::Engine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no loyalty provider configuration for shop {0}")]
    ConfigMissing(ShopDomain),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no transaction for cart {0}")]
    NotFound(CartToken),

    #[error("transaction for cart {cart} is already {status}")]
    NotPending {
        cart: CartToken,
        status: TransactionStatus,
    },

    #[error("confirm token for cart {cart} expired at {expires_at}, recalculate the cart")]
    Expired {
        cart: CartToken,
        expires_at: DateTime<Utc>,
    },

    /// The provider accepted a call whose answer was lost. Never retried.
    #[error("outcome of provider call for cart {cart} is unknown, manual reconciliation required: {source}")]
    OutcomeUnknown {
        cart: CartToken,
        source: ProviderError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<ValidationErrors> for EngineError {
    fn from(errors: ValidationErrors) -> Self {
        EngineError::Validation(errors.to_string())
    }
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Merchant not onboarded.
    ConfigMissing,
    /// Token issuance failed.
    Auth,
    /// Remote API rejected the call or was unreachable.
    Provider,
    NotFound,
    Expired,
    Validation,
    /// Cart already settled or awaiting reconciliation.
    Conflict,
    /// Provider may have applied the call; an operator must check.
    OutcomeUnknown,
}

impl ErrorKind {
    /// Whether the caller may retry later, after backoff.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Auth | ErrorKind::Provider)
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            EngineError::Validation(_) => ErrorKind::Validation,
            // a settled row has no open transaction to redeem against
            EngineError::NotFound(_) | EngineError::NotPending { .. } => ErrorKind::NotFound,
            EngineError::Expired { .. } => ErrorKind::Expired,
            EngineError::OutcomeUnknown { .. } => ErrorKind::OutcomeUnknown,
            EngineError::Store(_) => ErrorKind::Conflict,
            EngineError::Provider(err) if err.is_auth() => ErrorKind::Auth,
            EngineError::Provider(_) => ErrorKind::Provider,
        }
    }
}
