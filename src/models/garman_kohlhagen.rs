use crate::models::PricingModel;
use crate::state::{Greeks, ModelParams, OptionType};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Garman-Kohlhagen European currency option pricing.
///
/// Black-Scholes with the foreign risk-free rate playing the role of a
/// continuous dividend yield:
///
/// C = e^{-r_f T} S N(d1) - K e^{-r_d T} N(d2)
/// P = K e^{-r_d T} N(-d2) - e^{-r_f T} S N(-d1)
///
/// d1 = ln(S e^{-r_f T} / K e^{-r_d T}) / (sigma sqrt(T)) + sigma sqrt(T) / 2
/// d2 = d1 - sigma sqrt(T)
///
/// Spot and strike are domestic units per one unit of foreign currency.
pub struct GarmanKohlhagen {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

/// Closed-form price plus the intermediate arguments and local sensitivities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    pub price: f64,
    pub d1: f64,
    pub d2: f64,
    pub greeks: Greeks,
}

impl GarmanKohlhagen {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    /// Price and Greeks. Pure function of its inputs.
    ///
    /// Vega is per one volatility point (divided by 100), theta per
    /// calendar day (annual decay divided by 365).
    pub fn value(&self, params: &ModelParams, option_type: OptionType) -> Valuation {
        let s = params.spot;
        let k = params.strike;

        // Expired: intrinsic value. Checked before anything divides by sigma*sqrt(T).
        if params.ttl_years <= 0.0 {
            let delta = match option_type {
                OptionType::Call if s > k => 1.0,
                OptionType::Put if k > s => -1.0,
                _ => 0.0,
            };
            return Valuation {
                price: option_type.intrinsic(s, k),
                d1: 0.0,
                d2: 0.0,
                greeks: Greeks { delta, ..Greeks::default() },
            };
        }

        let df_f = params.foreign_df;
        let df_d = params.domestic_df;

        // No diffusion: the option is worth its discounted forward intrinsic value.
        if params.sigma_sqrt_t < 1e-12 {
            let forward_spot = s * df_f;
            let forward_strike = k * df_d;
            let (price, delta) = match option_type {
                OptionType::Call if forward_spot > forward_strike => (forward_spot - forward_strike, df_f),
                OptionType::Put if forward_strike > forward_spot => (forward_strike - forward_spot, -df_f),
                _ => (0.0, 0.0),
            };
            return Valuation {
                price,
                d1: 0.0,
                d2: 0.0,
                greeks: Greeks { delta, ..Greeks::default() },
            };
        }

        let sqrt_t = params.sqrt_t;
        let vol_sqrt_t = params.sigma_sqrt_t;
        let forward_spot = s * df_f;
        let forward_strike = k * df_d;

        let d1 = (forward_spot / forward_strike).ln() / vol_sqrt_t + vol_sqrt_t / 2.0;
        let d2 = d1 - vol_sqrt_t;

        let pdf_d1 = self.normal.pdf(d1);

        // Same for call and put
        let gamma = df_f * pdf_d1 / (s * vol_sqrt_t);
        let vega = s * df_f * pdf_d1 * sqrt_t;
        let decay = -(s * pdf_d1 * params.sigma * df_f) / (2.0 * sqrt_t);

        let rf = params.foreign_rate;
        let rd = params.domestic_rate;

        let (price, delta, theta_annual) = match option_type {
            OptionType::Call => {
                let n_d1 = self.normal.cdf(d1);
                let n_d2 = self.normal.cdf(d2);
                let price = df_f * s * n_d1 - k * df_d * n_d2;
                let theta = decay + rf * s * n_d1 * df_f - rd * k * n_d2 * df_d;
                (price, df_f * n_d1, theta)
            }
            OptionType::Put => {
                let n_neg_d1 = self.normal.cdf(-d1);
                let n_neg_d2 = self.normal.cdf(-d2);
                let price = k * df_d * n_neg_d2 - df_f * s * n_neg_d1;
                let theta = decay - rf * s * n_neg_d1 * df_f + rd * k * n_neg_d2 * df_d;
                (price, -df_f * n_neg_d1, theta)
            }
        };

        Valuation {
            price,
            d1,
            d2,
            greeks: Greeks {
                delta,
                gamma,
                vega: vega / 100.0,
                theta: theta_annual / 365.0,
            },
        }
    }
}

impl Default for GarmanKohlhagen {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingModel for GarmanKohlhagen {
    #[inline]
    fn name(&self) -> &'static str {
        "Garman-Kohlhagen"
    }

    #[inline]
    fn price(&self, params: &ModelParams, option_type: OptionType) -> f64 {
        self.value(params, option_type).price
    }
}
