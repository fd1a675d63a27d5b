pub mod market_data;
pub mod volatility;

pub use market_data::MarketDataService;
pub use volatility::VolatilityService;
