use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::error::ProviderError;
use super::token::TokenCache;
use super::types::{
    AccessToken, CancelItem, CancelPartialRequest, ConfirmRequest, Confirmation, RewardQuote,
    RewardRequest,
};
use super::CashbackProvider;
use crate::Amount;
use crate::config::MerchantConfig;

const API_KEY_HEADER: &str = "x-guper-apikey";
const API_SECRET_HEADER: &str = "x-guper-apisecret";
const AUTHORIZATION_HEADER: &str = "x-guper-authorization";

/// HTTP client of the Guper loyalty API.
#[derive(Debug)]
pub struct GuperClient {
    http: reqwest::Client,
    tokens: TokenCache,
}

impl GuperClient {
    pub fn new() -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("guper-cashback/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(http))
    }

    pub fn with_http(http: reqwest::Client) -> Self {
        Self {
            http,
            tokens: TokenCache::new(),
        }
    }

    /// Return a cached access token for the merchant, fetching a new one on miss.
    #[instrument(skip_all, fields(shop = %merchant.shop))]
    pub async fn access_token(&self, merchant: &MerchantConfig) -> Result<String, ProviderError> {
        if let Some(token) = self.tokens.get(&merchant.shop, Utc::now()) {
            return Ok(token);
        }

        let response = self
            .http
            .get(merchant.url("/api/connect/token"))
            .header(API_KEY_HEADER, &merchant.api_key)
            .header(API_SECRET_HEADER, &merchant.api_secret)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Auth {
                shop: merchant.shop.clone(),
                status: status.as_u16(),
            });
        }

        let token: AccessToken = serde_json::from_str(&response.text().await?)?;
        debug!(expires = %token.expires_in, "access token refreshed");
        self.tokens
            .store(&merchant.shop, token.access_token.clone(), token.expires_in);
        Ok(token.access_token)
    }

    /// POST to a loyalty endpoint; non-success statuses become [`ProviderError::Rejected`].
    async fn post(
        &self,
        merchant: &MerchantConfig,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, ProviderError> {
        let token = self.access_token(merchant).await?;

        let mut request = self
            .http
            .post(merchant.url(path))
            .header(AUTHORIZATION_HEADER, token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // force a fresh token on the next call
                self.tokens.invalidate(&merchant.shop);
            }
            let text = response.text().await?;
            warn!(path, status = status.as_u16(), body = %text, "provider rejected request");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response)
    }

    /// POST and decode the success body. Past a 2xx every failure is
    /// [`ProviderError::UnreadableResponse`], since the call was accepted.
    async fn post_for<R: DeserializeOwned>(
        &self,
        merchant: &MerchantConfig,
        path: &str,
        body: Value,
    ) -> Result<R, ProviderError> {
        let response = self.post(merchant, path, Some(body)).await?;
        let status = response.status().as_u16();
        let unreadable = |reason: String| {
            warn!(path, status, reason = %reason, "provider response unreadable");
            ProviderError::UnreadableResponse { status, reason }
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))
    }
}

#[async_trait]
impl CashbackProvider for GuperClient {
    #[instrument(skip_all, fields(shop = %merchant.shop))]
    async fn calculate(
        &self,
        merchant: &MerchantConfig,
        request: &RewardRequest,
    ) -> Result<RewardQuote, ProviderError> {
        let body = serde_json::to_value(request)?;
        self.post_for(merchant, "/api/loyalty/rewardByOrder", body)
            .await
    }

    #[instrument(skip_all, fields(shop = %merchant.shop, order = order_id))]
    async fn confirm(
        &self,
        merchant: &MerchantConfig,
        confirm_token: &str,
        order_id: &str,
        amount_to_redeem: Amount,
    ) -> Result<Confirmation, ProviderError> {
        let body = serde_json::to_value(ConfirmRequest {
            id: order_id,
            amount_to_redeem,
        })?;
        self.post_for(
            merchant,
            &format!("/api/loyalty/confirmOrder/{confirm_token}"),
            body,
        )
        .await
    }

    #[instrument(skip_all, fields(shop = %merchant.shop, tid = tid))]
    async fn cancel(&self, merchant: &MerchantConfig, tid: &str) -> Result<(), ProviderError> {
        self.post(
            merchant,
            &format!("/api/loyalty/cancelOrderByTransaction/{tid}"),
            None,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(shop = %merchant.shop, tid = tid, items = items.len()))]
    async fn cancel_partial(
        &self,
        merchant: &MerchantConfig,
        tid: &str,
        items: &[CancelItem],
    ) -> Result<(), ProviderError> {
        let body = serde_json::to_value(CancelPartialRequest { items })?;
        self.post(merchant, &format!("/api/loyalty/cancelPartial/{tid}"), Some(body))
            .await?;
        Ok(())
    }
}
