//! Errors raised while talking to the loyalty provider.

use thiserror::Error;

use crate::model::ShopDomain;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Token endpoint answered with a non-success status.
    #[error("authentication failed for shop {shop}: status {status}")]
    Auth { shop: ShopDomain, status: u16 },

    /// Provider rejected the call; `body` is its raw error payload.
    #[error("provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Provider accepted the call but its answer could not be read; it may have been applied.
    #[error("provider accepted request with status {status} but the response was unreadable: {reason}")]
    UnreadableResponse { status: u16, reason: String },
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth { .. })
    }

    /// Whether the remote side may have applied the call despite the error.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, ProviderError::UnreadableResponse { .. })
    }
}
