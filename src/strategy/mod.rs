//! Strategy Engine - Secondary consumers of the price signal
//!
//! The oracle feed is the primary consumer of every batch. A strategy gets the
//! same batches through its own event handler and reports liveness through a
//! windowed [`HeartbeatGroup`](crate::heartbeat::HeartbeatGroup): the group is
//! live while the strategy keeps seeing prices.

mod strategy_trait;

pub use strategy_trait::SecondaryStrategy;
#[cfg(test)]
pub use strategy_trait::MockSecondaryStrategy;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::heartbeat::HeartbeatGroup;
use crate::types::PriceBatch;

/// Direction of a price move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// A move between two consecutive batches beyond the threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviationSignal {
    pub currency: String,
    pub direction: Direction,
    pub from: Decimal,
    pub to: Decimal,
    /// Signed change in percent
    pub change_pct: Decimal,
}

/// Emits a signal whenever a currency moves more than `threshold_pct`
/// between consecutive batches
pub struct DeviationWatch {
    threshold_pct: Decimal,
    previous: Mutex<HashMap<String, Decimal>>,
    activity: Arc<HeartbeatGroup>,
}

impl DeviationWatch {
    pub fn new(threshold_pct: Decimal, activity: Arc<HeartbeatGroup>) -> Self {
        Self {
            threshold_pct: threshold_pct.abs(),
            previous: Mutex::new(HashMap::new()),
            activity,
        }
    }

    /// Build from the configured float threshold
    pub fn from_threshold(threshold_pct: f64, activity: Arc<HeartbeatGroup>) -> Result<Self> {
        let threshold = Decimal::from_f64(threshold_pct)
            .with_context(|| format!("strategy.threshold_pct {} is not finite", threshold_pct))?;
        Ok(Self::new(threshold, activity))
    }

    pub fn threshold_pct(&self) -> Decimal {
        self.threshold_pct
    }

    /// Compare `batch` with the previous one and remember it
    pub fn evaluate(&self, batch: &PriceBatch) -> Vec<DeviationSignal> {
        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
        let mut signals = Vec::new();

        for point in &batch.points {
            let last = previous.insert(point.currency.clone(), point.price);
            let Some(from) = last.filter(|p| !p.is_zero()) else {
                continue;
            };

            let change_pct = ((point.price - from) / from * Decimal::ONE_HUNDRED).round_dp(4);
            if change_pct.abs() < self.threshold_pct || change_pct.is_zero() {
                continue;
            }

            signals.push(DeviationSignal {
                currency: point.currency.clone(),
                direction: if change_pct.is_sign_positive() {
                    Direction::Up
                } else {
                    Direction::Down
                },
                from,
                to: point.price,
                change_pct,
            });
        }

        signals
    }
}

#[async_trait]
impl SecondaryStrategy for DeviationWatch {
    fn name(&self) -> &'static str {
        "deviationWatch"
    }

    async fn on_prices(&self, batch: PriceBatch) -> Result<()> {
        for signal in self.evaluate(&batch) {
            tracing::info!(
                currency = %signal.currency,
                direction = %signal.direction,
                from = %signal.from,
                to = %signal.to,
                change_pct = %signal.change_pct,
                "trade signal"
            );
        }
        self.activity.mark_alive();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::Liveness;
    use crate::types::PricePoint;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn watch(threshold: Decimal) -> (DeviationWatch, Arc<HeartbeatGroup>) {
        let group = Arc::new(HeartbeatGroup::windowed("tradeDex", Duration::from_secs(60)));
        (DeviationWatch::new(threshold, Arc::clone(&group)), group)
    }

    fn batch(dot: Decimal, btc: Decimal) -> PriceBatch {
        PriceBatch::new(vec![PricePoint::new("DOT", dot), PricePoint::new("BTC", btc)])
    }

    #[test]
    fn first_batch_only_sets_the_baseline() {
        let (watch, _) = watch(dec!(1));
        assert!(watch.evaluate(&batch(dec!(6.5), dec!(60000))).is_empty());
    }

    #[test]
    fn signals_moves_beyond_threshold() {
        let (watch, _) = watch(dec!(1));
        watch.evaluate(&batch(dec!(6.5), dec!(60000)));

        let signals = watch.evaluate(&batch(dec!(6.6), dec!(59700)));
        assert_eq!(
            signals,
            vec![DeviationSignal {
                currency: "DOT".to_string(),
                direction: Direction::Up,
                from: dec!(6.5),
                to: dec!(6.6),
                change_pct: dec!(1.5385),
            }]
        );

        // Baseline moved to the latest batch
        let signals = watch.evaluate(&batch(dec!(6.5), dec!(59000)));
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].direction, Direction::Down);
        assert_eq!(signals[1].currency, "BTC");
    }

    #[test]
    fn negative_threshold_is_treated_as_magnitude() {
        let (watch, _) = watch(dec!(-5));
        assert_eq!(watch.threshold_pct(), dec!(5));
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let group = Arc::new(HeartbeatGroup::windowed("tradeDex", Duration::from_secs(60)));
        assert!(DeviationWatch::from_threshold(f64::NAN, group).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn prices_keep_the_group_alive() {
        let (watch, group) = watch(dec!(1));

        watch.on_prices(batch(dec!(6.5), dec!(60000))).await.unwrap();
        assert_eq!(group.summary().status, Liveness::Live);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(group.summary().status, Liveness::Dead);
    }
}
