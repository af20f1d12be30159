pub mod amount;
pub mod api;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod provider;
pub mod store;
pub mod webhook;

pub use amount::Amount;
pub use engine::{Engine, EngineError, ErrorKind};
pub use model::{CashbackTransaction, IgnoreReason, OrderEvent, Outcome, TransactionStatus};
pub use provider::{CashbackProvider, GuperClient};
pub use store::TransactionStore;
