use crate::errors::{EngineError, EngineResult};
use crate::models::garman_kohlhagen::GarmanKohlhagen;
use crate::risk::scenarios::{self, HedgePosition};
use crate::state::{ModelParams, OptionType, PricingInput, PricingResult};

/// Strike implied by a protection level when none is given.
/// Calls (importers) protect above spot, puts (exporters) below.
#[inline]
pub fn strike_from_protection(spot: f64, protection_level: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => spot * (1.0 + protection_level),
        OptionType::Put => spot * (1.0 - protection_level),
    }
}

/// Reject inputs the pricing core cannot value. Nothing is computed on failure.
pub fn validate(input: &PricingInput) -> EngineResult<()> {
    if !(input.spot_rate > 0.0) || !input.spot_rate.is_finite() {
        return Err(EngineError::invalid_input(format!("spot_rate must be positive, got {}", input.spot_rate)));
    }
    if !(input.time_to_maturity_years >= 0.0) || !input.time_to_maturity_years.is_finite() {
        return Err(EngineError::invalid_input(format!(
            "time_to_maturity_years must be non-negative, got {}",
            input.time_to_maturity_years
        )));
    }
    if !(input.notional_amount > 0.0) || !input.notional_amount.is_finite() {
        return Err(EngineError::invalid_input(format!(
            "notional_amount must be positive, got {}",
            input.notional_amount
        )));
    }
    if input.time_to_maturity_years > 0.0 && (!(input.volatility > 0.0) || !input.volatility.is_finite()) {
        return Err(EngineError::invalid_input(format!(
            "volatility must be positive before expiry, got {}",
            input.volatility
        )));
    }
    if !input.domestic_rate.is_finite() || !input.foreign_rate.is_finite() {
        return Err(EngineError::invalid_input("risk-free rates must be finite"));
    }
    // Only consulted when the strike comes from the protection level
    if input.strike_price.is_none()
        && (!input.protection_level.is_finite() || !(0.0..1.0).contains(&input.protection_level))
    {
        return Err(EngineError::invalid_input(format!(
            "protection_level must be in [0, 1), got {}",
            input.protection_level
        )));
    }
    if let Some(k) = input.strike_price {
        if !(k > 0.0) || !k.is_finite() {
            return Err(EngineError::invalid_input(format!("strike_price must be positive, got {k}")));
        }
    }
    Ok(())
}

/// Price a protective option and assemble the full analytics.
///
/// Stateless: resolve strike, value with Garman-Kohlhagen, then run the
/// scenario table, payoff curve and breakeven on the resulting premium.
pub fn price_with_analytics(model: &GarmanKohlhagen, input: &PricingInput) -> EngineResult<PricingResult> {
    validate(input)?;

    let spot = input.spot_rate;
    let notional = input.notional_amount;
    let strike = input
        .strike_price
        .unwrap_or_else(|| strike_from_protection(spot, input.protection_level, input.option_type));

    let params = ModelParams::new(
        spot,
        strike,
        input.time_to_maturity_years,
        input.volatility,
        input.domestic_rate,
        input.foreign_rate,
    );
    let valuation = model.value(&params, input.option_type);

    let total_option_cost = valuation.price * notional;
    let position = HedgePosition {
        spot,
        strike,
        notional,
        option_type: input.option_type,
        total_option_cost,
    };

    Ok(PricingResult {
        option_price_per_unit: valuation.price,
        total_option_cost,
        cost_percentage: total_option_cost / (spot * notional) * 100.0,
        strike_price: strike,
        protection_level: input.protection_level,
        max_cost_to_firm: strike * notional,
        d1: valuation.d1,
        d2: valuation.d2,
        greeks: valuation.greeks,
        scenarios: scenarios::scenarios(&position),
        payoff_curve: scenarios::payoff_curve(&position),
        breakeven_rate: scenarios::breakeven_rate(&position),
    })
}
