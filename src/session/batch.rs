//! Batch accounting against the profit target

/// Trade count and equity baseline since the last batch close
///
/// Owned by the session loop worker; nothing else writes it. The target is
/// only evaluated at the batch-size boundary, not after every trade, which
/// keeps broker calls off the hot path at the cost of slower triggering.
#[derive(Debug, Clone)]
pub struct BatchTracker {
    trades_since_reset: u32,
    batch_start_equity: f64,
    batch_size: u32,
    profit_target: f64,
}

impl BatchTracker {
    pub fn new(batch_size: u32, profit_target: f64, start_equity: f64) -> Self {
        Self {
            trades_since_reset: 0,
            batch_start_equity: start_equity,
            batch_size,
            profit_target,
        }
    }

    /// True once enough trades accumulated to evaluate the target. The count
    /// keeps growing past the boundary until the target is met.
    pub fn at_boundary(&self) -> bool {
        self.trades_since_reset >= self.batch_size
    }

    /// Decision rule, checked only at the boundary.
    pub fn target_met(&self, current_equity: f64) -> bool {
        self.delta(current_equity) >= self.profit_target
    }

    /// Equity gain over the baseline.
    pub fn delta(&self, current_equity: f64) -> f64 {
        current_equity - self.batch_start_equity
    }

    /// Start the next batch. The baseline is the equity observed after
    /// flattening, so slippage on the closes lands in this batch, not the
    /// next one.
    pub fn reset(&mut self, post_flatten_equity: f64) {
        self.trades_since_reset = 0;
        self.batch_start_equity = post_flatten_equity;
    }

    /// Count one accepted order.
    pub fn record_trade(&mut self) {
        self.trades_since_reset += 1;
    }

    pub fn trades_since_reset(&self) -> u32 {
        self.trades_since_reset
    }

    pub fn batch_start_equity(&self) -> f64 {
        self.batch_start_equity
    }
}
