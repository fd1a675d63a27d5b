use crate::models::PricingModel;
use crate::state::{ModelParams, OptionType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Monte Carlo European currency option pricing under GBM.
///
/// S_T = S_0 * exp((r_d - r_f - sigma^2/2) * T + sigma * sqrt(T) * Z)
///
/// Price = e^{-r_d T} * mean(payoff(S_T)). Used as an independent
/// cross-check of the closed form; seeded, so results are reproducible.
pub struct MonteCarloGbm {
    pub simulations: usize,
    pub seed: u64,
}

/// Simulated price with its standard error.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SimulationResult {
    pub price: f64,
    pub std_error: f64,
    pub simulations: usize,
}

impl MonteCarloGbm {
    pub fn new(simulations: usize, seed: u64) -> Self {
        Self {
            simulations: simulations.max(2),
            seed,
        }
    }

    /// Simulate terminal spot rates.
    pub fn terminal_spots(&self, params: &ModelParams) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let t = params.ttl_years.max(0.0);
        let drift = (params.domestic_rate - params.foreign_rate - 0.5 * params.sigma * params.sigma) * t;
        let diffusion = params.sigma_sqrt_t;

        (0..self.simulations)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                params.spot * (drift + diffusion * z).exp()
            })
            .collect()
    }

    pub fn simulate(&self, params: &ModelParams, option_type: OptionType) -> SimulationResult {
        if params.ttl_years <= 0.0 {
            return SimulationResult {
                price: option_type.intrinsic(params.spot, params.strike),
                std_error: 0.0,
                simulations: 0,
            };
        }

        let df = params.domestic_df;
        let payoffs: Vec<f64> = self
            .terminal_spots(params)
            .into_iter()
            .map(|s_t| df * option_type.intrinsic(s_t, params.strike))
            .collect();

        let n = payoffs.len() as f64;
        let mean = payoffs.iter().sum::<f64>() / n;
        let var = payoffs.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / (n - 1.0);

        SimulationResult {
            price: mean,
            std_error: (var / n).sqrt(),
            simulations: payoffs.len(),
        }
    }
}

impl PricingModel for MonteCarloGbm {
    #[inline]
    fn name(&self) -> &'static str {
        "Monte-Carlo-GBM"
    }

    fn price(&self, params: &ModelParams, option_type: OptionType) -> f64 {
        self.simulate(params, option_type).price
    }
}
