//! Decoding of commerce platform webhook payloads into [`OrderEvent`]s.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::model::{MerchandiseId, OrderEvent, OrderId, RefundId};

pub const ORDERS_PAID: &str = "orders/paid";
pub const ORDERS_CANCELLED: &str = "orders/cancelled";
pub const REFUNDS_CREATE: &str = "refunds/create";
/// Some stores subscribe the refund payload under this topic.
pub const ORDERS_PARTIALLY_REFUNDED: &str = "orders/partially_refunded";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("unsupported webhook topic '{0}'")]
    UnsupportedTopic(String),

    #[error("malformed {topic} payload: {source}")]
    Payload {
        topic: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct PaidPayload {
    #[serde(deserialize_with = "platform_id")]
    id: OrderId,
    #[serde(default)]
    cart_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelledPayload {
    #[serde(deserialize_with = "platform_id")]
    id: OrderId,
}

#[derive(Debug, Deserialize)]
struct RefundPayload {
    // the refund itself; redeliveries repeat it
    #[serde(deserialize_with = "platform_id")]
    id: RefundId,
    #[serde(deserialize_with = "platform_id")]
    order_id: OrderId,
    #[serde(default)]
    refund_line_items: Vec<RefundLineItem>,
}

#[derive(Debug, Deserialize)]
struct RefundLineItem {
    line_item: LineItem,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    #[serde(default, deserialize_with = "optional_platform_id")]
    variant_id: Option<MerchandiseId>,
}

/// Platform ids arrive as JSON numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn platform_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_platform_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

fn parse<'a, T: Deserialize<'a>>(topic: &str, body: &'a [u8]) -> Result<T, WebhookError> {
    serde_json::from_slice(body).map_err(|source| WebhookError::Payload {
        topic: topic.to_string(),
        source,
    })
}

impl OrderEvent {
    /// Decode a webhook delivery of `topic` for `shop`.
    pub fn from_webhook(topic: &str, shop: &str, body: &[u8]) -> Result<Self, WebhookError> {
        let shop = shop.to_string();
        match topic {
            ORDERS_PAID => {
                let payload: PaidPayload = parse(topic, body)?;
                Ok(OrderEvent::Paid {
                    shop,
                    order_id: payload.id,
                    cart_token: payload.cart_token.filter(|t| !t.is_empty()),
                })
            }
            ORDERS_CANCELLED => {
                let payload: CancelledPayload = parse(topic, body)?;
                Ok(OrderEvent::Cancelled {
                    shop,
                    order_id: payload.id,
                })
            }
            REFUNDS_CREATE | ORDERS_PARTIALLY_REFUNDED => {
                let payload: RefundPayload = parse(topic, body)?;
                // custom line items carry no variant and earn no cashback
                let merchandise_ids = payload
                    .refund_line_items
                    .into_iter()
                    .filter_map(|item| item.line_item.variant_id)
                    .collect();
                Ok(OrderEvent::PartiallyRefunded {
                    shop,
                    order_id: payload.order_id,
                    refund_id: Some(payload.id),
                    merchandise_ids,
                })
            }
            other => Err(WebhookError::UnsupportedTopic(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP: &str = "acme.myshopify.com";

    #[test]
    fn paid_with_numeric_id() {
        let body = br#"{"id": 5512345678901, "cart_token": "c1", "total_price": "10.00"}"#;
        let event = OrderEvent::from_webhook(ORDERS_PAID, SHOP, body).unwrap();
        assert_eq!(
            event,
            OrderEvent::Paid {
                shop: SHOP.into(),
                order_id: "5512345678901".into(),
                cart_token: Some("c1".into()),
            }
        );
    }

    #[test]
    fn paid_without_cart_token() {
        let event = OrderEvent::from_webhook(ORDERS_PAID, SHOP, br#"{"id": 1, "cart_token": null}"#)
            .unwrap();
        assert!(matches!(event, OrderEvent::Paid { cart_token: None, .. }));

        let event =
            OrderEvent::from_webhook(ORDERS_PAID, SHOP, br#"{"id": 1, "cart_token": ""}"#).unwrap();
        assert!(matches!(event, OrderEvent::Paid { cart_token: None, .. }));
    }

    #[test]
    fn cancelled_with_string_id() {
        let event = OrderEvent::from_webhook(ORDERS_CANCELLED, SHOP, br#"{"id": "o1"}"#).unwrap();
        assert_eq!(
            event,
            OrderEvent::Cancelled {
                shop: SHOP.into(),
                order_id: "o1".into(),
            }
        );
    }

    #[test]
    fn refund_collects_variant_ids() {
        let body = br#"{
            "id": 99,
            "order_id": 42,
            "refund_line_items": [
                {"quantity": 1, "line_item": {"variant_id": 111}},
                {"quantity": 2, "line_item": {"variant_id": null}},
                {"quantity": 1, "line_item": {"variant_id": "222"}}
            ]
        }"#;
        let event = OrderEvent::from_webhook(REFUNDS_CREATE, SHOP, body).unwrap();
        assert_eq!(
            event,
            OrderEvent::PartiallyRefunded {
                shop: SHOP.into(),
                order_id: "42".into(),
                refund_id: Some("99".into()),
                merchandise_ids: vec!["111".into(), "222".into()],
            }
        );
    }

    #[test]
    fn partially_refunded_topic_uses_refund_payload() {
        let body = br#"{"id": 7, "order_id": "o1", "refund_line_items": []}"#;
        let event = OrderEvent::from_webhook(ORDERS_PARTIALLY_REFUNDED, SHOP, body).unwrap();
        assert!(matches!(
            event,
            OrderEvent::PartiallyRefunded { ref order_id, ref merchandise_ids, .. }
                if order_id == "o1" && merchandise_ids.is_empty()
        ));
    }

    #[test]
    fn refund_without_id_is_malformed() {
        let body = br#"{"order_id": 42, "refund_line_items": []}"#;
        let err = OrderEvent::from_webhook(REFUNDS_CREATE, SHOP, body).unwrap_err();
        assert!(matches!(err, WebhookError::Payload { .. }));
    }

    #[test]
    fn unsupported_topic() {
        let err = OrderEvent::from_webhook("products/update", SHOP, b"{}").unwrap_err();
        assert!(matches!(err, WebhookError::UnsupportedTopic(t) if t == "products/update"));
    }

    #[test]
    fn malformed_payload() {
        let err = OrderEvent::from_webhook(ORDERS_CANCELLED, SHOP, b"{\"name\": 1}").unwrap_err();
        assert!(matches!(err, WebhookError::Payload { .. }));
        assert!(err.to_string().contains("orders/cancelled"));
    }
}
