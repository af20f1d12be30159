//! Cashback reconciliation engine.
//!
//! The engine drives each cart's transaction through `pending -> confirmed ->
//! cancelled`. Storefront requests quote a cart and record the buyer's redeem
//! choice; order webhooks confirm or reverse the cashback with the provider.
//! Webhook mismatches are not errors: they resolve to [`Outcome::Ignored`] so the
//! platform stops redelivering them.

use chrono::Utc;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::Amount;
use crate::api::{CalculateRequest, CashbackQuote, RedeemRequest, RedeemResponse};
use crate::config::{EngineSettings, MerchantConfig, MerchantDirectory};
use crate::model::{
    CashbackTransaction, IgnoreReason, MerchandiseId, OrderEvent, Outcome, RefundId, Tid,
    TransactionStatus,
};
use crate::provider::types::INTERFACE;
use crate::provider::{CancelItem, CashbackProvider, ProviderError, RewardRequest};
use crate::store::{RowGuard, TransactionStore};

mod error;
pub use error::{EngineError, ErrorKind};

/// The reconciliation engine, shared by all concurrent request handlers.
pub struct Engine<P> {
    provider: P,
    merchants: MerchantDirectory,
    store: TransactionStore,
    settings: EngineSettings,
}

/// Public API
impl<P: CashbackProvider> Engine<P> {
    pub fn new(provider: P, merchants: MerchantDirectory) -> Self {
        Self {
            provider,
            merchants,
            store: TransactionStore::new(),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_store(mut self, store: TransactionStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run the engine over a stream of order events
    pub async fn run(&self, mut stream: impl Stream<Item = OrderEvent> + Unpin) {
        while let Some(event) = stream.next().await {
            // failures are logged by `apply` and must not stop the replay
            let _ = self.apply(event).await;
        }
    }

    /// Quote cashback for a cart and reset its transaction to `pending`.
    ///
    /// Any previous quote of the cart is discarded, including the redeem choice.
    pub async fn calculate(
        &self,
        shop: &str,
        request: CalculateRequest,
    ) -> Result<CashbackQuote, EngineError> {
        request.check()?;
        let merchant = self.merchant(shop)?;

        let CalculateRequest {
            cart_token,
            client,
            items,
            store_id,
        } = request;
        let reward = RewardRequest {
            interface: INTERFACE,
            store_id,
            client,
            items,
        };

        let quote = self.provider.calculate(merchant, &reward).await.inspect_err(|e| {
            warn!(shop, cart = %cart_token, error = %e, "cashback calculation failed");
        })?;

        self.store
            .upsert_quote(shop, &cart_token, quote.confirm_token.clone(), quote.expires_at)
            .await?;

        let response = CashbackQuote::from(&quote);
        info!(
            shop,
            cart = %cart_token,
            accumulating = %response.accumulating,
            redeemable = %response.redeemable,
            "cashback quoted"
        );
        Ok(response)
    }

    /// Handle a redeem-intent request from the storefront.
    pub async fn redeem(&self, request: RedeemRequest) -> Result<RedeemResponse, EngineError> {
        request.check()?;
        self.set_redeem_amount(&request.cart_token, request.amount_to_redeem)
            .await?;
        Ok(RedeemResponse::ok())
    }

    /// Record the buyer's redeem choice on a pending, unexpired transaction.
    pub async fn set_redeem_amount(&self, cart: &str, amount: Amount) -> Result<(), EngineError> {
        if cart.is_empty() {
            return Err(EngineError::Validation("cart token is required".to_string()));
        }
        if amount.is_negative() {
            return Err(EngineError::Validation(format!(
                "amount to redeem must not be negative, got {amount}"
            )));
        }

        let mut tx = self
            .store
            .lock_cart(cart)
            .await
            .ok_or_else(|| EngineError::NotFound(cart.to_string()))?;

        if !tx.is_pending() {
            return Err(EngineError::NotPending {
                cart: cart.to_string(),
                status: tx.status,
            });
        }

        if tx.is_expired(Utc::now()) {
            return Err(EngineError::Expired {
                cart: cart.to_string(),
                expires_at: tx.expires_at,
            });
        }

        tx.amount_to_redeem = amount;
        info!(cart, amount = %amount, "redeem amount recorded");
        Ok(())
    }

    /// Apply a single order event.
    ///
    /// Returns an error only when the provider call failed or the shop is not
    /// configured; every lookup or state mismatch is an ignored outcome.
    pub async fn apply(&self, event: OrderEvent) -> Result<Outcome, EngineError> {
        let result = match &event {
            OrderEvent::Paid {
                shop,
                order_id,
                cart_token,
            } => self.apply_paid(shop, order_id, cart_token.as_deref()).await,
            OrderEvent::Cancelled { shop, order_id } => self.apply_cancelled(shop, order_id).await,
            OrderEvent::PartiallyRefunded {
                shop,
                order_id,
                refund_id,
                merchandise_ids,
            } => {
                self.apply_partial_refund(shop, order_id, refund_id.as_ref(), merchandise_ids)
                    .await
            }
        };
        Self::log_result(&event, &result);
        result
    }
}

/// Private API
impl<P: CashbackProvider> Engine<P> {
    /// Small helper to log `apply` results
    fn log_result(event: &OrderEvent, result: &Result<Outcome, EngineError>) {
        let kind = event.kind();
        let shop = event.shop();
        let order = event.order_id();
        match result {
            Ok(Outcome::Applied) => {
                info!(shop, order, "{kind} applied");
            }
            Ok(Outcome::Ignored(reason)) if reason.is_suspicious() => {
                warn!(shop, order, reason = %reason, "{kind} ignored");
            }
            Ok(Outcome::Ignored(reason)) => {
                info!(shop, order, reason = %reason, "{kind} ignored");
            }
            Err(e) => {
                error!(shop, order, error = %e, "{kind} failed");
            }
        }
    }

    fn merchant(&self, shop: &str) -> Result<&MerchantConfig, EngineError> {
        self.merchants
            .get(shop)
            .ok_or_else(|| EngineError::ConfigMissing(shop.to_string()))
    }

    /// Guards shared by every transition on an existing row.
    fn check_row(&self, tx: &CashbackTransaction, shop: &str) -> Result<(), IgnoreReason> {
        if tx.shop != shop {
            return Err(IgnoreReason::ShopMismatch {
                expected: tx.shop.clone(),
                actual: shop.to_string(),
            });
        }
        if tx.needs_reconciliation {
            return Err(IgnoreReason::OutcomeUnknown);
        }
        if tx.failed_attempts >= self.settings.max_provider_attempts {
            return Err(IgnoreReason::AttemptsExhausted {
                attempts: tx.failed_attempts,
            });
        }
        Ok(())
    }

    /// Ensure a row can be (partially) cancelled and return its TID.
    fn cancellable_tid(&self, tx: &CashbackTransaction, shop: &str) -> Result<Tid, IgnoreReason> {
        if tx.status != TransactionStatus::Confirmed {
            return Err(IgnoreReason::NotConfirmed(tx.status));
        }
        let tid = tx.tid.clone().ok_or(IgnoreReason::MissingTid)?;
        self.check_row(tx, shop)?;
        Ok(tid)
    }

    /// Turn a provider failure into the engine error and update the row.
    ///
    /// A call the provider may have applied freezes the row for good; any other
    /// failure counts against the retry budget.
    fn fail(&self, tx: &mut RowGuard, err: ProviderError) -> EngineError {
        if err.is_outcome_unknown() {
            tx.needs_reconciliation = true;
            error!(
                cart = %tx.cart_token,
                order = ?tx.shopify_order_id,
                status = %tx.status,
                error = %err,
                "provider outcome unknown, manual reconciliation required"
            );
            return EngineError::OutcomeUnknown {
                cart: tx.cart_token.clone(),
                source: err,
            };
        }
        self.record_failure(tx);
        err.into()
    }

    /// Count a provider failure against the row; escalate once the budget is spent.
    fn record_failure(&self, tx: &mut RowGuard) {
        tx.failed_attempts += 1;
        if tx.failed_attempts >= self.settings.max_provider_attempts {
            error!(
                cart = %tx.cart_token,
                order = ?tx.shopify_order_id,
                status = %tx.status,
                attempts = tx.failed_attempts,
                "provider kept failing, manual reconciliation required"
            );
        }
    }

    /// Apply an order-paid event:
    /// - Find the transaction quoted for the order's cart
    /// - Check it is still pending and its confirm token is unexpired
    /// - Confirm with the provider using the last recorded redeem amount
    /// - Record order id and TID, index the row by order id
    async fn apply_paid(
        &self,
        shop: &str,
        order_id: &str,
        cart: Option<&str>,
    ) -> Result<Outcome, EngineError> {
        let Some(cart) = cart else {
            return Ok(Outcome::Ignored(IgnoreReason::MissingCartToken));
        };

        // Held until the row is written back, so duplicate deliveries wait here
        let Some(mut tx) = self.store.lock_cart(cart).await else {
            return Ok(Outcome::Ignored(IgnoreReason::UnknownCart(cart.to_string())));
        };

        if !tx.is_pending() {
            return Ok(Outcome::Ignored(IgnoreReason::NotPending(tx.status)));
        }
        if let Err(reason) = self.check_row(&tx, shop) {
            return Ok(Outcome::Ignored(reason));
        }
        if tx.is_expired(Utc::now()) {
            return Ok(Outcome::Ignored(IgnoreReason::QuoteExpired {
                expires_at: tx.expires_at,
            }));
        }

        let merchant = self.merchant(shop)?;
        let result = self
            .provider
            .confirm(merchant, &tx.confirm_token, order_id, tx.amount_to_redeem)
            .await;
        match result {
            Ok(confirmation) => {
                let accumulated = confirmation.accumulated_order();
                tx.confirm(order_id.to_string(), confirmation.tid, accumulated);
                self.store.index_order(order_id, cart);
                Ok(Outcome::Applied)
            }
            Err(e) => Err(self.fail(&mut tx, e)),
        }
    }

    /// Apply an order-cancelled event:
    /// - Find the transaction confirmed for the order
    /// - Check it is confirmed and carries a TID
    /// - Cancel with the provider, then mark the row cancelled
    async fn apply_cancelled(&self, shop: &str, order_id: &str) -> Result<Outcome, EngineError> {
        let Some(mut tx) = self.store.lock_order(order_id).await else {
            return Ok(Outcome::Ignored(IgnoreReason::UnknownOrder(order_id.to_string())));
        };

        let tid = match self.cancellable_tid(&tx, shop) {
            Ok(tid) => tid,
            Err(reason) => return Ok(Outcome::Ignored(reason)),
        };

        let merchant = self.merchant(shop)?;
        let result = self.provider.cancel(merchant, &tid).await;
        match result {
            Ok(()) => {
                tx.cancel();
                Ok(Outcome::Applied)
            }
            Err(e) => Err(self.fail(&mut tx, e)),
        }
    }

    /// Apply an order-partially-refunded event:
    /// - Same guards as a cancellation
    /// - Skip refunds already reversed by an earlier delivery
    /// - Cancel the refunded line items with the provider
    /// - Status stays `confirmed`, the refund id is remembered
    async fn apply_partial_refund(
        &self,
        shop: &str,
        order_id: &str,
        refund_id: Option<&RefundId>,
        merchandise_ids: &[MerchandiseId],
    ) -> Result<Outcome, EngineError> {
        let Some(mut tx) = self.store.lock_order(order_id).await else {
            return Ok(Outcome::Ignored(IgnoreReason::UnknownOrder(order_id.to_string())));
        };

        let tid = match self.cancellable_tid(&tx, shop) {
            Ok(tid) => tid,
            Err(reason) => return Ok(Outcome::Ignored(reason)),
        };

        if let Some(refund_id) = refund_id.filter(|id| tx.has_refund(id)) {
            return Ok(Outcome::Ignored(IgnoreReason::DuplicateRefund(
                refund_id.clone(),
            )));
        }

        if merchandise_ids.is_empty() {
            return Ok(Outcome::Ignored(IgnoreReason::NoRefundedItems));
        }

        let items: Vec<CancelItem> = merchandise_ids
            .iter()
            .cloned()
            .map(CancelItem::cancel)
            .collect();

        let merchant = self.merchant(shop)?;
        let result = self.provider.cancel_partial(merchant, &tid, &items).await;
        match result {
            Ok(()) => {
                tx.record_refund(refund_id.cloned());
                Ok(Outcome::Applied)
            }
            Err(e) => Err(self.fail(&mut tx, e)),
        }
    }
}
