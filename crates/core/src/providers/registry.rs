use std::time::Duration;

use tracing::warn;

use crate::config::ProvidersConfig;
use crate::models::asset::Market;

use super::alphavantage::AlphaVantageProvider;
use super::cafef::CafefProvider;
use super::coingecko::CoinGeckoProvider;
use super::pnj::PnjGoldProvider;
use super::traits::{GoldPriceProvider, QuoteProvider};
use super::yahoo_finance::YahooFinanceProvider;

/// Registry of all available price providers.
///
/// Quote providers are kept in registration order; for each market the
/// providers that support it form a fallback chain in that order.
pub struct ProviderRegistry {
    quote_providers: Vec<Box<dyn QuoteProvider>>,
    gold_providers: Vec<Box<dyn GoldPriceProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            quote_providers: Vec::new(),
            gold_providers: Vec::new(),
        }
    }

    /// Create a registry with all default providers pre-configured.
    pub fn new_with_defaults(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        let retry = config.retry;

        // CoinGecko — crypto, no API key needed
        registry.register(Box::new(CoinGeckoProvider::with_base_url(
            &config.coingecko_base_url,
            retry,
        )));

        // CafeF — domestic stocks, no API key needed
        registry.register(Box::new(CafefProvider::with_base_url(
            &config.cafef_base_url,
            retry,
            Duration::from_millis(config.cafef_delay_ms),
        )));

        // Yahoo Finance — foreign stocks, NO API key needed (primary)
        if config.yahoo_enabled {
            match YahooFinanceProvider::new() {
                Ok(yahoo) => registry.register(Box::new(yahoo)),
                Err(e) => warn!("Yahoo Finance unavailable: {e}"),
            }
        }

        // Alpha Vantage — foreign stocks, requires API key (fallback)
        if let Some(key) = config.alphavantage_api_key.as_ref().filter(|k| !k.is_empty()) {
            registry.register(Box::new(AlphaVantageProvider::with_base_url(
                &config.alphavantage_base_url,
                key.clone(),
                retry,
                Duration::from_millis(config.alphavantage_delay_ms),
            )));
        }

        // PNJ — gold
        registry.register_gold(Box::new(PnjGoldProvider::with_url(&config.pnj_url, retry)));

        registry
    }

    /// Register a new quote provider.
    pub fn register(&mut self, provider: Box<dyn QuoteProvider>) {
        self.quote_providers.push(provider);
    }

    pub fn register_gold(&mut self, provider: Box<dyn GoldPriceProvider>) {
        self.gold_providers.push(provider);
    }

    /// All providers for the market, ordered by registration priority.
    /// If the first one cannot resolve a symbol, the next one is tried.
    pub fn providers_for(&self, market: Market) -> Vec<&dyn QuoteProvider> {
        self.quote_providers
            .iter()
            .filter(|p| p.supported_markets().contains(&market))
            .map(|p| p.as_ref())
            .collect()
    }

    pub fn gold_providers(&self) -> Vec<&dyn GoldPriceProvider> {
        self.gold_providers.iter().map(|p| p.as_ref()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
