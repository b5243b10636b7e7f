use super::decision::SkipReason;

/// Base and last observed price for one symbol on one side of the book
///
/// `base` is the price at the last trade (or the first sample). `last` is the
/// previous tick's price and only exists to detect a reversal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceTracker {
    pub base: Option<f64>,
    pub last: Option<f64>,
}

impl PriceTracker {
    /// Buy side gate: wait for the price to turn back up after a drop
    pub fn observe_for_buy(&mut self, price: f64) -> Result<f64, SkipReason> {
        let base = match self.base {
            Some(base) => base,
            None => {
                self.base = Some(price);
                return Err(SkipReason::BasePriceInitialized);
            }
        };

        match self.last {
            Some(last) if price > last => Ok(base),
            _ => {
                self.last = Some(price);
                Err(SkipReason::TrackingReversal)
            }
        }
    }

    /// Sell side gate: wait for the price to turn back down after a rise
    pub fn observe_for_sell(&mut self, price: f64) -> Result<f64, SkipReason> {
        let base = match self.base {
            Some(base) => base,
            None => {
                self.base = Some(price);
                return Err(SkipReason::BasePriceInitialized);
            }
        };

        match self.last {
            Some(last) if price < last => Ok(base),
            _ => {
                self.last = Some(price);
                Err(SkipReason::TrackingReversal)
            }
        }
    }

    /// After a trade the reversal point becomes the new reference
    pub fn rebase(&mut self) {
        if let Some(last) = self.last {
            self.base = Some(last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_gate_sequence() {
        let mut tracker = PriceTracker::default();

        assert_eq!(tracker.observe_for_buy(100.0), Err(SkipReason::BasePriceInitialized));
        assert_eq!(tracker.observe_for_buy(95.0), Err(SkipReason::TrackingReversal));
        assert_eq!(tracker.observe_for_buy(94.0), Err(SkipReason::TrackingReversal));
        assert_eq!(tracker.observe_for_buy(94.0), Err(SkipReason::TrackingReversal));
        assert_eq!(tracker.observe_for_buy(96.0), Ok(100.0));
        assert_eq!(tracker.last, Some(94.0));
    }

    #[test]
    fn test_sell_gate_sequence() {
        let mut tracker = PriceTracker::default();

        assert_eq!(tracker.observe_for_sell(100.0), Err(SkipReason::BasePriceInitialized));
        assert_eq!(tracker.observe_for_sell(105.0), Err(SkipReason::TrackingReversal));
        assert_eq!(tracker.observe_for_sell(105.0), Err(SkipReason::TrackingReversal));
        assert_eq!(tracker.observe_for_sell(103.0), Ok(100.0));
    }

    #[test]
    fn test_rebase_uses_last_price() {
        let mut tracker = PriceTracker {
            base: Some(100.0),
            last: Some(95.0),
        };
        tracker.rebase();
        assert_eq!(tracker.base, Some(95.0));

        let mut fresh = PriceTracker::default();
        fresh.rebase();
        assert_eq!(fresh.base, None);
    }
}
