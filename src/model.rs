//! Core domain types for cashback reconciliation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// Merchant shop domain, e.g. `acme.myshopify.com`.
pub type ShopDomain = String;

/// Pre-checkout cart identifier.
pub type CartToken = String;

/// Platform order identifier.
pub type OrderId = String;

/// Provider transaction id, issued on confirmation.
pub type Tid = String;

/// Product variant identifier used for partial cancellations.
pub type MerchandiseId = String;

/// Platform refund identifier, stable across webhook redeliveries.
pub type RefundId = String;

/// Lifecycle state of a [`CashbackTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Quoted, redeem amount still mutable.
    #[default]
    Pending,
    /// Confirmed with the provider; carries a TID.
    Confirmed,
    // Cancelled is terminal
    Cancelled,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Confirmed => write!(f, "confirmed"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Cashback lifecycle of one cart, from quote to confirmation and cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackTransaction {
    pub shop: ShopDomain,
    pub cart_token: CartToken,
    pub confirm_token: String,
    pub expires_at: DateTime<Utc>,
    pub amount_to_redeem: Amount,
    pub status: TransactionStatus,
    pub shopify_order_id: Option<OrderId>,
    pub tid: Option<Tid>,
    pub accumulated_order: Option<Amount>,
    /// Consecutive provider failures on this row, reset by any successful transition.
    #[serde(default)]
    pub failed_attempts: u32,
    /// Provider may have applied a call whose answer was lost; never call it again for this row.
    #[serde(default)]
    pub needs_reconciliation: bool,
    /// Refunds already reversed with the provider.
    #[serde(default, with = "space_separated")]
    pub refund_ids: Vec<RefundId>,
}

impl CashbackTransaction {
    /// Create a fresh pending transaction from a provider quote.
    pub fn new(
        shop: ShopDomain,
        cart_token: CartToken,
        confirm_token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            shop,
            cart_token,
            confirm_token,
            expires_at,
            amount_to_redeem: Amount::ZERO,
            status: TransactionStatus::Pending,
            shopify_order_id: None,
            tid: None,
            accumulated_order: None,
            failed_attempts: 0,
            needs_reconciliation: false,
            refund_ids: Vec::new(),
        }
    }

    /// Replace the quote of a pending transaction. The redeem choice is zeroed.
    pub fn requote(&mut self, shop: ShopDomain, confirm_token: String, expires_at: DateTime<Utc>) {
        debug_assert!(self.is_pending());
        self.shop = shop;
        self.confirm_token = confirm_token;
        self.expires_at = expires_at;
        self.amount_to_redeem = Amount::ZERO;
        self.status = TransactionStatus::Pending;
        self.accumulated_order = None;
        self.failed_attempts = 0;
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pending -> Confirmed. Sets the order id and TID, which are never cleared afterwards.
    pub fn confirm(&mut self, order_id: OrderId, tid: Tid, accumulated_order: Option<Amount>) {
        debug_assert!(self.is_pending());
        self.shopify_order_id = Some(order_id);
        self.tid = Some(tid);
        self.accumulated_order = accumulated_order;
        self.status = TransactionStatus::Confirmed;
        self.failed_attempts = 0;
    }

    /// Confirmed -> Cancelled.
    pub fn cancel(&mut self) {
        debug_assert_eq!(self.status, TransactionStatus::Confirmed);
        self.status = TransactionStatus::Cancelled;
        self.failed_attempts = 0;
    }

    pub fn has_refund(&self, refund_id: &str) -> bool {
        self.refund_ids.iter().any(|id| id == refund_id)
    }

    /// Record a partial reversal; status stays `confirmed`.
    pub fn record_refund(&mut self, refund_id: Option<RefundId>) {
        if let Some(refund_id) = refund_id {
            self.refund_ids.push(refund_id);
        }
        self.failed_attempts = 0;
    }
}

/// Lists stored as one space separated field, so snapshots stay one row per transaction.
mod space_separated {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ids: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ids.join(" "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .split_whitespace()
            .map(String::from)
            .collect())
    }
}

/// Asynchronous order events delivered by the commerce platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// Order paid; confirms the quoted cashback of its cart.
    Paid {
        shop: ShopDomain,
        order_id: OrderId,
        cart_token: Option<CartToken>,
    },
    /// Order cancelled; fully reverses a confirmed transaction.
    Cancelled { shop: ShopDomain, order_id: OrderId },
    /// Some line items refunded; reverses the cashback of those items only.
    ///
    /// Without a `refund_id` redeliveries cannot be told apart.
    PartiallyRefunded {
        shop: ShopDomain,
        order_id: OrderId,
        refund_id: Option<RefundId>,
        merchandise_ids: Vec<MerchandiseId>,
    },
}

impl OrderEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Paid { .. } => "order paid",
            OrderEvent::Cancelled { .. } => "order cancelled",
            OrderEvent::PartiallyRefunded { .. } => "order partially refunded",
        }
    }

    pub fn shop(&self) -> &str {
        match self {
            OrderEvent::Paid { shop, .. }
            | OrderEvent::Cancelled { shop, .. }
            | OrderEvent::PartiallyRefunded { shop, .. } => shop,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::Paid { order_id, .. }
            | OrderEvent::Cancelled { order_id, .. }
            | OrderEvent::PartiallyRefunded { order_id, .. } => order_id,
        }
    }
}

/// Result of a reconciliation transition that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored(IgnoreReason),
}

/// Why a transition was treated as a successful no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Paid order without a cart token (draft or manual order).
    MissingCartToken,
    UnknownCart(CartToken),
    UnknownOrder(OrderId),
    /// Event shop differs from the shop that quoted the cart.
    ShopMismatch { expected: ShopDomain, actual: ShopDomain },
    NotPending(TransactionStatus),
    NotConfirmed(TransactionStatus),
    MissingTid,
    QuoteExpired { expires_at: DateTime<Utc> },
    NoRefundedItems,
    /// Refund already reversed by an earlier delivery.
    DuplicateRefund(RefundId),
    /// Provider kept failing; the row needs manual reconciliation.
    AttemptsExhausted { attempts: u32 },
    /// An earlier provider answer was lost; the row needs manual reconciliation.
    OutcomeUnknown,
}

impl IgnoreReason {
    /// Whether the mismatch deserves operator attention rather than being routine.
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            IgnoreReason::ShopMismatch { .. }
                | IgnoreReason::QuoteExpired { .. }
                | IgnoreReason::AttemptsExhausted { .. }
                | IgnoreReason::OutcomeUnknown
        )
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::MissingCartToken => write!(f, "order has no cart token"),
            IgnoreReason::UnknownCart(cart) => write!(f, "no transaction for cart {cart}"),
            IgnoreReason::UnknownOrder(order) => write!(f, "no transaction for order {order}"),
            IgnoreReason::ShopMismatch { expected, actual } => {
                write!(f, "transaction belongs to shop {expected}, not {actual}")
            }
            IgnoreReason::NotPending(status) => write!(f, "transaction already {status}"),
            IgnoreReason::NotConfirmed(status) => write!(f, "transaction is {status}, not confirmed"),
            IgnoreReason::MissingTid => write!(f, "transaction has no TID"),
            IgnoreReason::QuoteExpired { expires_at } => {
                write!(f, "confirm token expired at {expires_at}")
            }
            IgnoreReason::NoRefundedItems => write!(f, "refund has no line items"),
            IgnoreReason::DuplicateRefund(id) => write!(f, "refund {id} already reversed"),
            IgnoreReason::AttemptsExhausted { attempts } => {
                write!(f, "provider failed {attempts} times, manual reconciliation required")
            }
            IgnoreReason::OutcomeUnknown => {
                write!(f, "previous provider outcome unknown, manual reconciliation required")
            }
        }
    }
}
