pub mod registry;
pub mod traits;
pub mod util;

// API provider implementations
pub mod alphavantage;
pub mod cafef;
pub mod coingecko;
pub mod pnj;
pub mod yahoo_finance;

pub use registry::ProviderRegistry;
pub use traits::{GoldPriceProvider, QuoteProvider};
pub use util::RetryPolicy;
