//! Protective exit evaluation.
//!
//! Stop-loss may fire on any bar after entry. Take-profit is suppressed
//! until the position has been held `min_holding_bars` bars.

use sigx_core::{Bracket, Position, PositionSide, Price};

// ============================================================================
// ExitDecision
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    StopLoss,
    TakeProfit,
}

impl ExitDecision {
    #[must_use]
    pub fn is_exit(&self) -> bool {
        !matches!(self, Self::Hold)
    }
}

// ============================================================================
// ExitPolicy
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ExitPolicy {
    min_holding_bars: u32,
}

impl ExitPolicy {
    pub fn new(min_holding_bars: u32) -> Self {
        Self { min_holding_bars }
    }

    #[must_use]
    pub fn min_holding_bars(&self) -> u32 {
        self.min_holding_bars
    }

    /// Evaluate `position` at `last_price` after `bars_held` bars.
    ///
    /// Bar 0 is the entry bar and never exits.
    #[must_use]
    pub fn evaluate(
        &self,
        position: &Position,
        bars_held: u32,
        last_price: Price,
        bracket: &Bracket,
    ) -> ExitDecision {
        if bars_held == 0 {
            return ExitDecision::Hold;
        }

        let (stop_hit, target_hit) = match position.side {
            PositionSide::Long => (
                last_price <= bracket.stop_price,
                last_price >= bracket.target_price,
            ),
            PositionSide::Short => (
                last_price >= bracket.stop_price,
                last_price <= bracket.target_price,
            ),
        };

        if stop_hit {
            ExitDecision::StopLoss
        } else if target_hit && bars_held >= self.min_holding_bars {
            ExitDecision::TakeProfit
        } else {
            ExitDecision::Hold
        }
    }
}
