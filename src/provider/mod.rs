//! Loyalty provider client.
//!
//! [`CashbackProvider`] is the seam the reconciliation engine talks through;
//! [`GuperClient`] implements it over HTTP with a per-shop access token cache.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Amount;
use crate::config::MerchantConfig;

mod client;
pub use client::GuperClient;

mod error;
pub use error::ProviderError;

mod token;
pub use token::TokenCache;

pub mod types;
pub use types::{Buyer, CancelItem, CartItem, Confirmation, RewardQuote, RewardRequest};

/// Remote operations of the loyalty provider.
///
/// `confirm` is not deduplicated by the provider; callers must invoke it at most
/// once per confirm token.
#[async_trait]
pub trait CashbackProvider: Send + Sync {
    /// Quote accumulation and redemption for the current cart contents.
    async fn calculate(
        &self,
        merchant: &MerchantConfig,
        request: &RewardRequest,
    ) -> Result<RewardQuote, ProviderError>;

    /// Confirm a quote against a paid order.
    async fn confirm(
        &self,
        merchant: &MerchantConfig,
        confirm_token: &str,
        order_id: &str,
        amount_to_redeem: Amount,
    ) -> Result<Confirmation, ProviderError>;

    /// Fully reverse a confirmed transaction.
    async fn cancel(&self, merchant: &MerchantConfig, tid: &str) -> Result<(), ProviderError>;

    /// Reverse the cashback of specific line items only.
    async fn cancel_partial(
        &self,
        merchant: &MerchantConfig,
        tid: &str,
        items: &[CancelItem],
    ) -> Result<(), ProviderError>;
}

#[async_trait]
impl<T: CashbackProvider + ?Sized> CashbackProvider for Arc<T> {
    async fn calculate(
        &self,
        merchant: &MerchantConfig,
        request: &RewardRequest,
    ) -> Result<RewardQuote, ProviderError> {
        (**self).calculate(merchant, request).await
    }

    async fn confirm(
        &self,
        merchant: &MerchantConfig,
        confirm_token: &str,
        order_id: &str,
        amount_to_redeem: Amount,
    ) -> Result<Confirmation, ProviderError> {
        (**self)
            .confirm(merchant, confirm_token, order_id, amount_to_redeem)
            .await
    }

    async fn cancel(&self, merchant: &MerchantConfig, tid: &str) -> Result<(), ProviderError> {
        (**self).cancel(merchant, tid).await
    }

    async fn cancel_partial(
        &self,
        merchant: &MerchantConfig,
        tid: &str,
        items: &[CancelItem],
    ) -> Result<(), ProviderError> {
        (**self).cancel_partial(merchant, tid, items).await
    }
}
