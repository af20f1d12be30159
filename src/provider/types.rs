//! Wire types of the Guper loyalty API.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::Amount;
use crate::model::MerchandiseId;

/// Value of the `interface` field identifying the commerce platform.
pub const INTERFACE: &str = "shopify";

/// Buyer identity, forwarded to the provider when the customer is logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_calling_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cellphone: Option<String>,
}

/// One cart line; `price` is the unit price in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CartItem {
    // validator matches on the written type, so no `MerchandiseId` alias here
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(custom = "non_negative")]
    pub price: Amount,
}

pub(crate) fn non_negative(amount: &Amount) -> Result<(), ValidationError> {
    if amount.is_negative() {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

/// Body of `POST /api/loyalty/rewardByOrder`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRequest {
    pub interface: &'static str,
    pub store_id: Option<String>,
    pub client: Option<Buyer>,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardQuote {
    pub confirm_token: String,
    #[serde(deserialize_with = "provider_timestamp")]
    pub expires_at: DateTime<Utc>,
    pub cashback: QuoteCashback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCashback {
    pub this_order: ThisOrder,
    pub user_balance: UserBalance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThisOrder {
    pub accumulating: Total,
    pub redeemable: Total,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Total {
    pub total: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub available_amount: Amount,
}

/// Body of `POST /api/loyalty/confirmOrder/{confirmToken}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfirmRequest<'a> {
    pub id: &'a str,
    pub amount_to_redeem: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "TID", deserialize_with = "provider_id")]
    pub tid: String,
    #[serde(default)]
    pub cashback: Option<ConfirmedCashback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedCashback {
    pub accumulated_order: Option<Amount>,
}

impl Confirmation {
    pub fn accumulated_order(&self) -> Option<Amount> {
        self.cashback.as_ref().and_then(|c| c.accumulated_order)
    }
}

/// Line item to reverse in `POST /api/loyalty/cancelPartial/{TID}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelItem {
    pub id: MerchandiseId,
    pub cancel: bool,
}

impl CancelItem {
    pub fn cancel(id: MerchandiseId) -> Self {
        Self { id, cancel: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CancelPartialRequest<'a> {
    pub items: &'a [CancelItem],
}

/// Response of `GET /api/connect/token`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccessToken {
    pub access_token: String,
    #[serde(deserialize_with = "provider_timestamp")]
    pub expires_in: DateTime<Utc>,
}

/// Identifiers arrive as JSON strings or numbers.
fn provider_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    })
}

/// The provider sends instants either as RFC 3339 strings or epoch milliseconds.
fn provider_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
        Raw::Millis(millis) => Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp {millis} out of range"))),
    }
}
