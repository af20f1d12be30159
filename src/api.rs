//! Request/response contract of the storefront endpoints and webhook acknowledgement.
//!
//! Routing is left to the hosting HTTP framework; handlers decode these types,
//! call the [`Engine`](crate::Engine) and map errors with [`status_code`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::Amount;
use crate::engine::{EngineError, ErrorKind};
use crate::model::Outcome;
use crate::provider::types::non_negative;
use crate::provider::{Buyer, CartItem, RewardQuote};

/// Body of the calculate endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    #[validate(length(min = 1))]
    pub cart_token: String,
    #[serde(default)]
    pub client: Option<Buyer>,
    #[validate(length(min = 1))]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub store_id: Option<String>,
}

impl CalculateRequest {
    /// Validate the request and every nested buyer and item.
    pub fn check(&self) -> Result<(), EngineError> {
        self.validate()?;
        if let Some(client) = &self.client {
            client.validate()?;
        }
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }
}

/// Cashback figures returned to the storefront, all in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashbackQuote {
    pub accumulating: Amount,
    pub redeemable: Amount,
    pub user_balance: Amount,
    pub expires_at: DateTime<Utc>,
}

impl From<&RewardQuote> for CashbackQuote {
    fn from(quote: &RewardQuote) -> Self {
        Self {
            accumulating: quote.cashback.this_order.accumulating.total,
            redeemable: quote.cashback.this_order.redeemable.total,
            user_balance: quote.cashback.user_balance.available_amount,
            expires_at: quote.expires_at,
        }
    }
}

/// Body of the redeem-intent endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[validate(length(min = 1))]
    pub cart_token: String,
    #[validate(custom = "non_negative")]
    pub amount_to_redeem: Amount,
}

impl RedeemRequest {
    pub fn check(&self) -> Result<(), EngineError> {
        Ok(self.validate()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemResponse {
    pub ok: bool,
}

impl RedeemResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Error payload of the storefront endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// HTTP status answered to the storefront for an error kind.
///
/// `410` tells the checkout to recalculate the cart.
pub fn status_code(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Validation => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::Conflict => 409,
        ErrorKind::Expired => 410,
        ErrorKind::ConfigMissing => 500,
        ErrorKind::Auth | ErrorKind::Provider | ErrorKind::OutcomeUnknown => 502,
    }
}

/// HTTP status acknowledging a webhook delivery.
///
/// Outcomes, ignored or applied, are always acknowledged. Only provider and auth
/// failures ask the platform to redeliver; the engine caps those per transaction.
/// A call the provider may have applied is acknowledged and left to an operator.
pub fn webhook_status(result: &Result<Outcome, EngineError>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(err) if err.kind().is_retryable() => 500,
        Err(_) => 200,
    }
}
