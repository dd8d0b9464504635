// ═══════════════════════════════════════════════════════════════════
// Provider Tests — CoinGecko, CafeF, Alpha Vantage, PNJ, retry policy
// ═══════════════════════════════════════════════════════════════════

use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use couples_finance_core::config::ProvidersConfig;
use couples_finance_core::errors::CoreError;
use couples_finance_core::models::asset::Market;
use couples_finance_core::models::price::GoldType;
use couples_finance_core::providers::alphavantage::AlphaVantageProvider;
use couples_finance_core::providers::cafef::{parse_change_text, stock_name, CafefProvider};
use couples_finance_core::providers::coingecko::{change_from_percent, CoinGeckoProvider};
use couples_finance_core::providers::pnj::{classify, parse_thousands, PnjGoldProvider};
use couples_finance_core::providers::registry::ProviderRegistry;
use couples_finance_core::providers::traits::{GoldPriceProvider, QuoteProvider};
use couples_finance_core::providers::util::{is_retryable, RetryPolicy};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_delay_ms: 1,
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinGecko
// ═══════════════════════════════════════════════════════════════════

#[test_log::test(tokio::test)]
async fn test_coingecko_parses_vnd_prices() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "bitcoin,ethereum,notacoin"))
        .and(query_param("vs_currencies", "vnd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "bitcoin": { "vnd": 1500000000, "vnd_24h_change": 2.5, "vnd_market_cap": 3.0e16 },
                "ethereum": { "vnd": 80000000 }
            }"#,
        ))
        .mount(&mock_server)
        .await;

    let provider = CoinGeckoProvider::with_base_url(mock_server.uri(), RetryPolicy::none());
    let quotes = provider
        .fetch_quotes(&symbols(&["btc", "ETH", "NOTACOIN"]))
        .await
        .unwrap();

    assert_eq!(quotes.len(), 2);
    let btc = &quotes[0];
    assert_eq!(btc.symbol, "BTC");
    assert_eq!(btc.price, 1_500_000_000.0);
    assert_eq!(btc.change_percent, 2.5);
    assert!(approx(btc.change, change_from_percent(1_500_000_000.0, 2.5)));
    assert_eq!(btc.market_cap, Some(3.0e16));
    assert_eq!(btc.currency, "vnd");
    assert_eq!(btc.source, "CoinGecko");

    let eth = &quotes[1];
    assert_eq!(eth.change, 0.0);
    assert_eq!(eth.change_percent, 0.0);
}

#[test]
fn test_coingecko_coin_ids() {
    let provider = CoinGeckoProvider::new(RetryPolicy::none());
    assert_eq!(provider.coin_id("btc"), "bitcoin");
    assert_eq!(provider.coin_id("MATIC"), "matic-network");
    assert_eq!(provider.coin_id("PEPE"), "pepe");
}

#[test]
fn test_change_from_percent() {
    // 110 after a 10% rise from 100
    assert!(approx(change_from_percent(110.0, 10.0), 10.0));
    assert!(approx(change_from_percent(90.0, -10.0), -10.0));
    assert_eq!(change_from_percent(50.0, 0.0), 0.0);
    assert_eq!(change_from_percent(50.0, -100.0), 0.0);
}

// ═══════════════════════════════════════════════════════════════════
// CafeF
// ═══════════════════════════════════════════════════════════════════

const CAFEF_PATH: &str = "/du-lieu/Ajax/PageNew/DataHistory/PriceHistory.ashx";

#[test_log::test(tokio::test)]
async fn test_cafef_scales_thousands_and_skips_missing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CAFEF_PATH))
        .and(query_param("Symbol", "vnm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{ "Success": true, "Data": { "Data": [
                { "GiaDieuChinh": 65.3, "KhoiLuongKhopLenh": 1234500, "ThayDoi": "0.5(0.77 %)" }
            ] } }"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(CAFEF_PATH))
        .and(query_param("Symbol", "xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{ "Success": false, "Data": null }"#))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(CAFEF_PATH))
        .and(query_param("Symbol", "fpt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{ "Success": true, "Data": { "Data": [
                { "GiaDieuChinh": 120.0, "KhoiLuongKhopLenh": null, "ThayDoi": "n/a" }
            ] } }"#,
        ))
        .mount(&mock_server)
        .await;

    let provider = CafefProvider::with_base_url(mock_server.uri(), RetryPolicy::none(), Duration::ZERO);
    let quotes = provider
        .fetch_quotes(&symbols(&["VNM", "XYZ", "FPT"]))
        .await
        .unwrap();

    assert_eq!(quotes.len(), 2);
    let vnm = &quotes[0];
    assert_eq!(vnm.symbol, "VNM");
    assert_eq!(vnm.name.as_deref(), Some("Vinamilk"));
    assert!(approx(vnm.price, 65_300.0));
    assert!(approx(vnm.change, 500.0));
    assert!(approx(vnm.change_percent, 0.77));
    assert_eq!(vnm.volume, Some(1_234_500.0));
    assert_eq!(vnm.source, "CafeF");

    let fpt = &quotes[1];
    assert!(approx(fpt.price, 120_000.0));
    assert_eq!(fpt.change, 0.0);
    assert_eq!(fpt.volume, Some(0.0));
}

#[test]
fn test_parse_change_text() {
    assert_eq!(parse_change_text("0.5(0.77 %)"), (0.5, 0.77));
    assert_eq!(parse_change_text("-1.2(-2.5%)"), (-1.2, -2.5));
    assert_eq!(parse_change_text(" +3(+1.1 %) "), (3.0, 1.1));
    assert_eq!(parse_change_text("garbage"), (0.0, 0.0));
    assert_eq!(parse_change_text(""), (0.0, 0.0));
}

#[test]
fn test_stock_name_lookup() {
    assert_eq!(stock_name("hpg"), Some("Hòa Phát Group"));
    assert_eq!(stock_name("AAPL"), None);
}

// ═══════════════════════════════════════════════════════════════════
// Alpha Vantage
// ═══════════════════════════════════════════════════════════════════

#[test_log::test(tokio::test)]
async fn test_alphavantage_global_quote() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("function", "GLOBAL_QUOTE"))
        .and(query_param("symbol", "AAPL"))
        .and(query_param("apikey", "demo"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{ "Global Quote": {
                "01. symbol": "AAPL",
                "05. price": "189.9500",
                "06. volume": "51234567",
                "09. change": "-1.2300",
                "10. change percent": "-0.6434%"
            } }"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("symbol", "MSFT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{ "Note": "Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day." }"#,
        ))
        .mount(&mock_server)
        .await;

    let provider = AlphaVantageProvider::with_base_url(
        mock_server.uri(),
        "demo".to_string(),
        RetryPolicy::none(),
        Duration::ZERO,
    );
    let quotes = provider.fetch_quotes(&symbols(&["aapl", "MSFT"])).await.unwrap();

    assert_eq!(quotes.len(), 1);
    let aapl = &quotes[0];
    assert_eq!(aapl.symbol, "AAPL");
    assert!(approx(aapl.price, 189.95));
    assert!(approx(aapl.change, -1.23));
    assert!(approx(aapl.change_percent, -0.6434));
    assert_eq!(aapl.volume, Some(51_234_567.0));
    assert_eq!(aapl.currency, "usd");
}

// ═══════════════════════════════════════════════════════════════════
// PNJ gold
// ═══════════════════════════════════════════════════════════════════

#[test_log::test(tokio::test)]
async fn test_pnj_parses_and_classifies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gold"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{ "locations": [ { "name": "TPHCM", "gold_type": [
                { "name": "SJC", "gia_mua": "75.000", "gia_ban": "77.000" },
                { "name": "Nhẫn Trơn PNJ 999.9", "gia_mua": "62.500", "gia_ban": "63.800" },
                { "name": "Vàng nữ trang 24K", "gia_mua": "61.900", "gia_ban": "63.100" },
                { "name": "PNJ", "gia_mua": "62.500", "gia_ban": "63.800" },
                { "name": "Broken", "gia_mua": "", "gia_ban": "1.000" }
            ] } ] }"#,
        ))
        .mount(&mock_server)
        .await;

    let provider = PnjGoldProvider::with_url(format!("{}/gold", mock_server.uri()), RetryPolicy::none());
    let quotes = provider.fetch_gold_prices().await.unwrap();

    assert_eq!(quotes.len(), 4);
    assert_eq!(quotes[0].gold_type, GoldType::Sjc);
    assert_eq!(quotes[0].buy_price, 75_000_000.0);
    assert_eq!(quotes[0].sell_price, 77_000_000.0);
    assert_eq!(quotes[1].gold_type, GoldType::NuTrang);
    assert_eq!(quotes[2].gold_type, GoldType::NuTrang);
    assert_eq!(quotes[3].gold_type, GoldType::Pnj);
    assert!(quotes.iter().all(|q| q.change == 0.0 && q.source == "PNJ"));
}

#[tokio::test]
async fn test_pnj_without_locations_is_empty() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{ "locations": [] }"#))
        .mount(&mock_server)
        .await;

    let provider = PnjGoldProvider::with_url(mock_server.uri(), RetryPolicy::none());
    assert!(provider.fetch_gold_prices().await.unwrap().is_empty());
}

#[test]
fn test_pnj_helpers() {
    assert_eq!(parse_thousands("75.000"), Some(75_000_000.0));
    assert_eq!(parse_thousands("1,250"), Some(1_250_000.0));
    assert_eq!(parse_thousands(" "), None);
    assert_eq!(parse_thousands("abc"), None);
    assert_eq!(classify("SJC"), GoldType::Sjc);
    assert_eq!(classify("SJC 1 chỉ"), GoldType::Pnj);
    assert_eq!(classify("Nhẫn Trơn"), GoldType::NuTrang);
}

// ═══════════════════════════════════════════════════════════════════
// Retry behaviour
// ═══════════════════════════════════════════════════════════════════

#[test_log::test(tokio::test)]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{ "bitcoin": { "vnd": 1 } }"#))
        .mount(&mock_server)
        .await;

    let provider = CoinGeckoProvider::with_base_url(mock_server.uri(), fast_retry());
    let quotes = provider.fetch_quotes(&symbols(&["BTC"])).await.unwrap();

    assert_eq!(quotes.len(), 1);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_retries_give_up_after_attempts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let provider = CoinGeckoProvider::with_base_url(mock_server.uri(), fast_retry());
    let err = provider.fetch_quotes(&symbols(&["BTC"])).await.unwrap_err();

    assert!(matches!(err, CoreError::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = CoinGeckoProvider::with_base_url(mock_server.uri(), fast_retry());
    let err = provider.fetch_quotes(&symbols(&["BTC"])).await.unwrap_err();

    assert!(matches!(err, CoreError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_api_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = CoinGeckoProvider::with_base_url(mock_server.uri(), fast_retry());
    let err = provider.fetch_quotes(&symbols(&["BTC"])).await.unwrap_err();

    assert!(matches!(err, CoreError::Api { .. }));
}

#[test]
fn test_retry_policy_backoff() {
    let policy = RetryPolicy {
        attempts: 4,
        base_delay_ms: 100,
    };
    assert_eq!(policy.delay_for(1, false), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2, false), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3, false), Duration::from_millis(400));
    assert_eq!(policy.delay_for(2, true), Duration::from_millis(400));
    assert_eq!(RetryPolicy::none().delay_for(5, true), Duration::ZERO);

    let status = |status| CoreError::HttpStatus {
        provider: "x".into(),
        status,
    };
    assert!(is_retryable(&CoreError::Network("reset".into())));
    assert!(is_retryable(&status(429)));
    assert!(is_retryable(&status(502)));
    assert!(!is_retryable(&status(401)));
    assert!(!is_retryable(&CoreError::ValidationError("bad".into())));
}

// ═══════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════

fn chain(registry: &ProviderRegistry, market: Market) -> Vec<String> {
    registry
        .providers_for(market)
        .iter()
        .map(|p| p.name().to_string())
        .collect()
}

#[test]
fn test_default_registry_chains() {
    let registry = ProviderRegistry::new_with_defaults(&ProvidersConfig::default());
    assert_eq!(chain(&registry, Market::Crypto), vec!["CoinGecko"]);
    assert_eq!(chain(&registry, Market::DomesticStock), vec!["CafeF"]);
    assert_eq!(chain(&registry, Market::ForeignStock), vec!["Yahoo Finance"]);
    assert_eq!(registry.gold_providers().len(), 1);

    let config = ProvidersConfig {
        alphavantage_api_key: Some("key".into()),
        ..ProvidersConfig::default()
    };
    let registry = ProviderRegistry::new_with_defaults(&config);
    assert_eq!(
        chain(&registry, Market::ForeignStock),
        vec!["Yahoo Finance", "Alpha Vantage"]
    );

    let config = ProvidersConfig {
        yahoo_enabled: false,
        ..ProvidersConfig::default()
    };
    let registry = ProviderRegistry::new_with_defaults(&config);
    assert!(registry.providers_for(Market::ForeignStock).is_empty());
}
