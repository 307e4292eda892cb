//! Risk management: sizing caps and circuit breakers.
//!
//! - `engine`: bankroll-derived dollar caps and headroom-aware sizing
//! - `breaker`: daily-loss latch and rejection-burst window

pub mod breaker;
pub mod engine;

pub use breaker::{CircuitBreaker, LossCheck};
pub use engine::{CapKind, RiskEngine, RiskLimits, SizeDecision};
