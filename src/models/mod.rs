pub mod garman_kohlhagen;
pub mod monte_carlo;
pub mod volatility;

use crate::state::{ModelParams, OptionType};

/// All pricing models implement this trait.
/// price() must be a pure function: deterministic output from inputs only.
/// Send + Sync required for use across tokio tasks.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fair value per unit of foreign-currency notional, in domestic units.
    fn price(&self, params: &ModelParams, option_type: OptionType) -> f64;
}
