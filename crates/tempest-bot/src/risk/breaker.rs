//! Trading circuit breakers: daily-loss latch and rejection burst.
//!
//! The daily-loss breaker latches once tripped and releases only at the
//! next UTC calendar day or by manual reset. The rejection breaker trips
//! when too many order rejections land inside a sliding window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::warn;

/// Result of the daily-loss check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCheck {
    Ok,
    Tripped,
}

/// Latched breakers guarding the order path.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Daily-loss latch.
    loss_tripped: AtomicBool,
    /// UTC day the loss latch tripped on; a new day auto-releases it.
    loss_trip_day: Mutex<Option<NaiveDate>>,

    /// Rejection timestamps inside the sliding window.
    rejects: Mutex<VecDeque<DateTime<Utc>>>,
    reject_window: Duration,
    reject_limit: usize,
}

impl CircuitBreaker {
    pub fn new(reject_window: Duration, reject_limit: usize) -> Self {
        Self {
            loss_tripped: AtomicBool::new(false),
            loss_trip_day: Mutex::new(None),
            rejects: Mutex::new(VecDeque::new()),
            reject_window,
            reject_limit,
        }
    }

    /// Evaluate the daily-loss condition: trips when
    /// `realized + unrealized <= -cap`. Once tripped, stays tripped for
    /// the rest of the UTC day regardless of later marks.
    pub fn check_daily_loss(
        &self,
        realized_pnl: Decimal,
        unrealized_pnl: Decimal,
        cap: Decimal,
        now: DateTime<Utc>,
    ) -> LossCheck {
        let today = now.date_naive();

        // Day boundary auto-release.
        {
            let mut trip_day = self.loss_trip_day.lock();
            if let Some(day) = *trip_day {
                if day != today {
                    *trip_day = None;
                    self.loss_tripped.store(false, Ordering::Release);
                }
            }
        }

        if self.loss_tripped.load(Ordering::Acquire) {
            return LossCheck::Tripped;
        }

        let total = realized_pnl + unrealized_pnl;
        if total <= -cap {
            self.loss_tripped.store(true, Ordering::Release);
            *self.loss_trip_day.lock() = Some(today);
            warn!(%total, %cap, "daily loss breaker tripped");
            return LossCheck::Tripped;
        }

        LossCheck::Ok
    }

    /// Whether the daily-loss latch currently holds.
    pub fn loss_tripped(&self, now: DateTime<Utc>) -> bool {
        let trip_day = self.loss_trip_day.lock();
        match *trip_day {
            Some(day) => day == now.date_naive() && self.loss_tripped.load(Ordering::Acquire),
            None => false,
        }
    }

    /// Record one order rejection; returns the count inside the window.
    pub fn record_rejection(&self, now: DateTime<Utc>) -> usize {
        let mut rejects = self.rejects.lock();
        rejects.push_back(now);
        Self::evict(&mut rejects, now, self.reject_window);
        rejects.len()
    }

    /// Whether rejections inside the window have reached the trip limit.
    pub fn rejection_burst(&self, now: DateTime<Utc>) -> bool {
        let mut rejects = self.rejects.lock();
        Self::evict(&mut rejects, now, self.reject_window);
        rejects.len() >= self.reject_limit
    }

    /// Manual reset: clears both the loss latch and the rejection window.
    /// Operator action after reviewing the underlying condition.
    pub fn reset(&self) {
        self.loss_tripped.store(false, Ordering::Release);
        *self.loss_trip_day.lock() = None;
        self.rejects.lock().clear();
    }

    fn evict(rejects: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
        let cutoff = now
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::minutes(15));
        while rejects.front().is_some_and(|t| *t < cutoff) {
            rejects.pop_front();
        }
    }
}
