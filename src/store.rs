//! Keyed store of cashback transactions.
//!
//! Every row sits behind its own async mutex. Transitions lock the row, read
//! its state, call the provider and write back while still holding the guard,
//! so concurrent triggers on the same cart or order are serialized.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{CartToken, CashbackTransaction, OrderId, ShopDomain, TransactionStatus};

type Row = Arc<Mutex<CashbackTransaction>>;

/// Exclusive access to one transaction row.
pub type RowGuard = OwnedMutexGuard<CashbackTransaction>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cart {cart} is already {status} and cannot be requoted")]
    Settled {
        cart: CartToken,
        status: TransactionStatus,
    },

    #[error("cart {cart} awaits manual reconciliation and cannot be requoted")]
    Unreconciled { cart: CartToken },
}

#[derive(Debug, Default)]
pub struct TransactionStore {
    by_cart: DashMap<CartToken, Row>,
    /// Secondary index, filled when an order confirms its cart.
    by_order: DashMap<OrderId, CartToken>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously snapshotted rows. Later rows win on duplicate carts.
    pub fn from_transactions(rows: impl IntoIterator<Item = CashbackTransaction>) -> Self {
        let store = Self::new();
        for row in rows {
            if let Some(order_id) = &row.shopify_order_id {
                store.by_order.insert(order_id.clone(), row.cart_token.clone());
            }
            store
                .by_cart
                .insert(row.cart_token.clone(), Arc::new(Mutex::new(row)));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.by_cart.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cart.is_empty()
    }

    /// Create or reset the pending transaction of `cart` with a fresh quote.
    ///
    /// Confirmed and cancelled rows are left untouched.
    pub async fn upsert_quote(
        &self,
        shop: &str,
        cart: &str,
        confirm_token: String,
        expires_at: DateTime<Utc>,
    ) -> Result<CashbackTransaction, StoreError> {
        let row = Arc::clone(&*self.by_cart.entry(cart.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(CashbackTransaction::new(
                ShopDomain::from(shop),
                cart.to_string(),
                confirm_token.clone(),
                expires_at,
            )))
        }));

        let mut tx = row.lock().await;
        if !tx.is_pending() {
            return Err(StoreError::Settled {
                cart: cart.to_string(),
                status: tx.status,
            });
        }
        // the old confirm token may already be confirmed remotely
        if tx.needs_reconciliation {
            return Err(StoreError::Unreconciled {
                cart: cart.to_string(),
            });
        }
        tx.requote(shop.to_string(), confirm_token, expires_at);
        Ok(tx.clone())
    }

    /// Lock the transaction quoted for `cart`.
    pub async fn lock_cart(&self, cart: &str) -> Option<RowGuard> {
        let row = self.by_cart.get(cart).map(|r| Arc::clone(r.value()))?;
        Some(row.lock_owned().await)
    }

    /// Lock the transaction confirmed for `order_id`.
    pub async fn lock_order(&self, order_id: &str) -> Option<RowGuard> {
        let cart = self.by_order.get(order_id).map(|c| c.value().clone())?;
        self.lock_cart(&cart).await
    }

    /// Make the row of `cart` reachable by `order_id`. Call while holding its guard.
    pub fn index_order(&self, order_id: &str, cart: &str) {
        self.by_order.insert(order_id.to_string(), cart.to_string());
    }

    /// Copy of the transaction of `cart`.
    pub async fn get(&self, cart: &str) -> Option<CashbackTransaction> {
        let guard = self.lock_cart(cart).await?;
        Some(guard.clone())
    }

    /// Copy of every transaction, ordered by cart token.
    pub async fn snapshot(&self) -> Vec<CashbackTransaction> {
        let rows: Vec<Row> = self.by_cart.iter().map(|r| Arc::clone(r.value())).collect();
        let mut snapshot = Vec::with_capacity(rows.len());
        for row in rows {
            snapshot.push(row.lock().await.clone());
        }
        snapshot.sort_by(|a, b| a.cart_token.cmp(&b.cart_token));
        snapshot
    }
}
