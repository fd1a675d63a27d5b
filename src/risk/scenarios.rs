//! Scenario and payoff analysis for a priced hedge.
//!
//! Turns a premium and strike into the numbers a treasurer decides on:
//! cost under five spot shocks, a payoff curve for charting, and a
//! breakeven rate. All functions are pure.

use crate::state::{OptionType, PayoffPoint, ScenarioPoint};
use smallvec::SmallVec;

/// Relative spot shocks evaluated in the scenario table.
pub const SCENARIO_SHOCKS: [f64; 5] = [-0.10, -0.05, 0.0, 0.05, 0.10];

/// Number of points on the payoff curve.
pub const PAYOFF_POINTS: usize = 50;

/// Payoff curve spans spot * [PAYOFF_LOW, PAYOFF_HIGH], endpoints included.
pub const PAYOFF_LOW: f64 = 0.85;
pub const PAYOFF_HIGH: f64 = 1.15;

/// A priced position, the input to every analysis here.
#[derive(Debug, Clone, Copy)]
pub struct HedgePosition {
    pub spot: f64,
    pub strike: f64,
    pub notional: f64,
    pub option_type: OptionType,
    /// Premium for the whole notional (price per unit * notional).
    pub total_option_cost: f64,
}

impl HedgePosition {
    /// Option payoff on the whole notional if the future spot is `future_spot`.
    #[inline]
    pub fn option_payoff(&self, future_spot: f64) -> f64 {
        self.option_type.intrinsic(future_spot, self.strike) * self.notional
    }

    pub fn scenario(&self, future_spot: f64) -> ScenarioPoint {
        let unhedged_cost = future_spot * self.notional;
        let option_payoff = self.option_payoff(future_spot);
        let net_cost = unhedged_cost + self.total_option_cost - option_payoff;
        ScenarioPoint {
            future_spot_rate: future_spot,
            unhedged_cost,
            option_payoff,
            net_cost,
            savings_vs_unhedged: unhedged_cost - net_cost,
        }
    }

    pub fn payoff_point(&self, future_spot: f64) -> PayoffPoint {
        let unhedged_pnl = (future_spot - self.spot) * self.notional;
        let option_payoff = self.option_payoff(future_spot);
        PayoffPoint {
            spot_rate: future_spot,
            unhedged_pnl,
            option_payoff,
            net_pnl: unhedged_pnl + option_payoff - self.total_option_cost,
        }
    }
}

/// Cost outcomes at spot shocks of -10%, -5%, 0%, +5%, +10%, in that order.
pub fn scenarios(position: &HedgePosition) -> SmallVec<[ScenarioPoint; 5]> {
    SCENARIO_SHOCKS
        .iter()
        .map(|shock| position.scenario(position.spot * (1.0 + shock)))
        .collect()
}

/// 50 evenly spaced points from 85% to 115% of spot, both ends included.
pub fn payoff_curve(position: &HedgePosition) -> Vec<PayoffPoint> {
    let low = position.spot * PAYOFF_LOW;
    let high = position.spot * PAYOFF_HIGH;
    let step = (high - low) / (PAYOFF_POINTS - 1) as f64;
    (0..PAYOFF_POINTS)
        .map(|i| {
            // Pin the last point to the exact upper bound.
            let spot = if i == PAYOFF_POINTS - 1 { high } else { low + step * i as f64 };
            position.payoff_point(spot)
        })
        .collect()
}

/// Approximate breakeven: spot + premium per unit.
///
/// This is not a root of "net cost = unhedged cost"; it assumes the payoff
/// is locally linear near breakeven. The same additive form is used for
/// calls and puts.
#[inline]
pub fn breakeven_rate(position: &HedgePosition) -> f64 {
    position.spot + position.total_option_cost / position.notional
}
