//! Order Management System.
//!
//! - `intent`: deterministic intent keys (hex SHA-256 of the canonical
//!   tuple) and client order ids
//! - `order`: the order type with validated state transitions
//! - `executor`: shadow and exchange-backed execution
//! - `manager`: idempotent submission and the cancel/replace policy
//! - `reconcile`: startup and in-cycle reconciliation against the exchange

pub mod executor;
pub mod intent;
pub mod manager;
pub mod order;
pub mod reconcile;

pub use executor::{ExchangeExecutor, ExecutionResult, Executor, ShadowExecutor};
pub use intent::{client_order_id, import_key, Intent};
pub use manager::{Oms, OrderPlan, ReplaceOutcome, SubmitOutcome};
pub use order::Order;
pub use reconcile::{reconcile_fills, startup_reconcile, FillSyncReport, StartupReport};
