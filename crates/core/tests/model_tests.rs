// ═══════════════════════════════════════════════════════════════════
// Model Tests — MonthKey, BalanceRecord, rates, gold, log entries
// ═══════════════════════════════════════════════════════════════════

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use couples_finance_core::errors::CoreError;
use couples_finance_core::models::asset::{AssetType, Investment, Market};
use couples_finance_core::models::balance::{BalanceRecord, LedgerEntryType, LedgerTransaction, MonthKey};
use couples_finance_core::models::logs::{entry_timestamp, ErrorLogEntry};
use couples_finance_core::models::owner::OwnerScope;
use couples_finance_core::models::price::{GoldAverage, GoldQuote, GoldType, MarketQuote};
use couples_finance_core::models::rate::{GoldPriceRecord, RateSnapshot, RateType, SyncStatus};

fn month(s: &str) -> MonthKey {
    s.parse().unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// OwnerScope
// ═══════════════════════════════════════════════════════════════════

mod owner_scope {
    use super::*;

    #[test]
    fn partitions() {
        let solo = OwnerScope::user("u1");
        let pair = OwnerScope::couple("u1", "c9");
        assert_eq!(solo.partition(), "users/u1");
        assert_eq!(pair.partition(), "couples/c9");
        assert_eq!(pair.balance_collection(), "couples/c9/availableBalance");
        assert_eq!(solo.transaction_collection(), "users/u1/availableBalanceTransactions");
        assert_eq!(pair.to_string(), "couples/c9");
    }
}

// ═══════════════════════════════════════════════════════════════════
// MonthKey
// ═══════════════════════════════════════════════════════════════════

mod month_key {
    use super::*;

    #[test]
    fn parse_and_display() {
        let m = month("2025-03");
        assert_eq!(m.year(), 2025);
        assert_eq!(m.month(), 3);
        assert_eq!(m.to_string(), "2025-03");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["2025-13", "2025-00", "2025-3", "25-03", "2025/03", "", "abcd-ef"] {
            assert!(
                matches!(bad.parse::<MonthKey>(), Err(CoreError::ValidationError(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn previous_crosses_year() {
        assert_eq!(month("2025-01").previous(), month("2024-12"));
        assert_eq!(month("2025-07").previous(), month("2025-06"));
    }

    #[test]
    fn ordering_is_chronological() {
        let mut months = vec![month("2025-01"), month("2024-12"), month("2025-10"), month("2025-02")];
        months.sort();
        let sorted: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(sorted, vec!["2024-12", "2025-01", "2025-02", "2025-10"]);
    }

    #[test]
    fn from_datetime_uses_utc() {
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 23, 30, 0).unwrap();
        assert_eq!(MonthKey::from_datetime(at), month("2025-01"));
    }

    #[test]
    fn serde_as_string() {
        assert_eq!(serde_json::to_value(month("2025-04")).unwrap(), json!("2025-04"));
        let back: MonthKey = serde_json::from_value(json!("2024-11")).unwrap();
        assert_eq!(back, month("2024-11"));
        assert!(serde_json::from_value::<MonthKey>(json!("2024-1")).is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════
// BalanceRecord & LedgerTransaction
// ═══════════════════════════════════════════════════════════════════

mod balance_record {
    use super::*;

    #[test]
    fn signed_amounts() {
        let ten = Decimal::from(10);
        assert_eq!(LedgerEntryType::Income.signed(ten), ten);
        assert_eq!(LedgerEntryType::Spending.signed(ten), -ten);
        assert_eq!(LedgerEntryType::Investment.signed(ten), -ten);
    }

    #[test]
    fn apply_keeps_invariants() {
        let now = Utc::now();
        let owner = OwnerScope::couple("u1", "c1");
        let mut record = BalanceRecord::open(&owner, month("2025-02"), Decimal::from(1_000), now);
        assert!(record.is_consistent());

        assert_eq!(record.apply(LedgerEntryType::Income, Decimal::from(500), now), Decimal::from(500));
        assert_eq!(record.apply(LedgerEntryType::Spending, Decimal::from(200), now), Decimal::from(-200));
        record.apply(LedgerEntryType::Investment, Decimal::from(2_000), now);

        assert_eq!(record.balance, Decimal::from(-700));
        assert_eq!(record.net_change, Decimal::from(-1_700));
        assert_eq!(record.opening_balance, Decimal::from(1_000));
        assert!(record.is_consistent());

        record.net_change = Decimal::ZERO;
        assert!(!record.is_consistent());
    }

    #[test]
    fn decimal_amounts_are_exact() {
        let now = Utc::now();
        let mut record = BalanceRecord::open(&OwnerScope::user("u"), month("2025-02"), Decimal::ZERO, now);
        for _ in 0..10 {
            record.apply(LedgerEntryType::Income, Decimal::new(1, 1), now);
        }
        assert_eq!(record.balance, Decimal::ONE);
    }

    #[test]
    fn camel_case_document_shape() {
        let now = Utc::now();
        let record = BalanceRecord::open(&OwnerScope::user("u"), month("2025-02"), Decimal::ZERO, now);
        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["userId"], json!("u"));
        assert_eq!(doc["month"], json!("2025-02"));
        assert!(doc.get("coupleId").is_none());
        assert!(doc.get("incomeAdded").is_some());
    }

    #[test]
    fn transaction_consistency() {
        let entry = LedgerTransaction {
            id: uuid::Uuid::new_v4(),
            user_id: "u".into(),
            couple_id: None,
            entry_type: LedgerEntryType::Spending,
            amount: Decimal::from(-50),
            description: "Groceries".into(),
            source_id: "txn-1".into(),
            balance_before: Decimal::from(100),
            balance_after: Decimal::from(50),
            month: month("2025-02"),
            sequence: 3,
            timestamp: Utc::now(),
        };
        assert!(entry.is_consistent());
        let doc = serde_json::to_value(&entry).unwrap();
        assert_eq!(doc["type"], json!("spending"));

        let broken = LedgerTransaction {
            balance_after: Decimal::from(60),
            ..entry
        };
        assert!(!broken.is_consistent());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Investments
// ═══════════════════════════════════════════════════════════════════

mod investment {
    use super::*;

    #[test]
    fn new_normalizes_symbol_and_owner() {
        let owner = OwnerScope::couple("u1", "c1");
        let inv = Investment::new(&owner, " vnm ", AssetType::Stock, 100.0, Decimal::from(6_500_000), "");
        assert_eq!(inv.symbol, "VNM");
        assert_eq!(inv.owner(), owner);
        let doc = serde_json::to_value(&inv).unwrap();
        assert_eq!(doc["assetType"], json!("stock"));
    }

    #[test]
    fn market_display() {
        let names: Vec<String> = Market::ALL.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, vec!["crypto", "domestic-stock", "foreign-stock"]);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Rates & gold
// ═══════════════════════════════════════════════════════════════════

mod rates {
    use super::*;

    fn quote() -> MarketQuote {
        MarketQuote {
            symbol: "BTC".into(),
            name: None,
            price: 1_500_000_000.0,
            change: 10.0,
            change_percent: 1.0,
            market_cap: Some(1.0),
            volume: None,
            currency: "vnd".into(),
            source: "CoinGecko".into(),
        }
    }

    fn gold(gold_type: GoldType, buy: f64, sell: f64, change: f64) -> GoldQuote {
        GoldQuote {
            gold_type,
            name: gold_type.to_string(),
            buy_price: buy,
            sell_price: sell,
            change,
            change_percent: 0.0,
            source: "PNJ".into(),
        }
    }

    #[test]
    fn snapshot_requires_future_next_update() {
        let now = Utc::now();
        let snapshot = RateSnapshot::from_quote(&quote(), RateType::Crypto, now, now + chrono::Duration::minutes(30)).unwrap();
        assert_eq!(snapshot.symbol, "BTC");
        assert_eq!(snapshot.market_cap, Some(1.0));
        let doc = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(doc["type"], json!("crypto"));
        assert!(doc.get("buyPrice").is_none());

        assert!(matches!(
            RateSnapshot::from_quote(&quote(), RateType::Crypto, now, now),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn gold_average_rounds_means() {
        let quotes = vec![
            gold(GoldType::Sjc, 100.0, 111.0, 3.0),
            gold(GoldType::Pnj, 101.0, 110.0, 0.0),
        ];
        let avg = GoldAverage::from_quotes(&quotes).unwrap();
        // 100.5 and 110.5 round away from zero; 1.5 likewise.
        assert_eq!(avg.buy_price, 101.0);
        assert_eq!(avg.sell_price, 111.0);
        assert_eq!(avg.change, 2.0);
        assert!((avg.change_percent - 1.5 / 100.5 * 100.0).abs() < 1e-9);

        assert!(GoldAverage::from_quotes(&[]).is_none());
        let zero = GoldAverage::from_quotes(&[gold(GoldType::Pnj, 0.0, 0.0, 5.0)]).unwrap();
        assert_eq!(zero.change_percent, 0.0);
    }

    #[test]
    fn gold_snapshot_uses_average_sell() {
        let now = Utc::now();
        let avg = GoldAverage::from_quotes(&[gold(GoldType::Sjc, 75.0, 77.0, 0.0)]).unwrap();
        let snapshot = RateSnapshot::gold_average(&avg, "PNJ", now, now + chrono::Duration::days(1)).unwrap();
        assert_eq!(snapshot.symbol, "GOLD");
        assert_eq!(snapshot.rate_type, RateType::Gold);
        assert_eq!(snapshot.price, 77.0);
        assert_eq!(snapshot.buy_price, Some(75.0));
        assert_eq!(snapshot.currency, "vnd");
    }

    #[test]
    fn gold_record_document() {
        let record = GoldPriceRecord {
            quote: gold(GoldType::NuTrang, 1.0, 2.0, 0.0),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            timestamp: Utc::now(),
        };
        assert_eq!(record.document_id(), "2025-03-01_NUTRANG");
        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["type"], json!("NUTRANG"));
        assert_eq!(doc["buyPrice"], json!(1.0));
        assert_eq!(doc["date"], json!("2025-03-01"));
    }

    #[test]
    fn sync_status_defaults_missing_fields() {
        let status: SyncStatus = serde_json::from_value(json!({ "goldCount": 4 })).unwrap();
        assert_eq!(status.gold_count, 4);
        assert!(status.last_crypto_stock_update.is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Log entries
// ═══════════════════════════════════════════════════════════════════

mod logs {
    use super::*;

    #[test]
    fn error_entry_timestamp_is_readable() {
        let entry = ErrorLogEntry::new("gold_update_error", "refresh_gold_prices", CoreError::Unauthorized);
        let doc = serde_json::to_value(&entry).unwrap();
        assert_eq!(doc["type"], json!("gold_update_error"));
        assert_eq!(doc["error"], json!("Unauthorized"));
        assert_eq!(entry_timestamp(&doc), Some(entry.timestamp));
    }

    #[test]
    fn missing_or_bad_timestamp() {
        assert_eq!(entry_timestamp(&json!({})), None);
        assert_eq!(entry_timestamp(&json!({ "timestamp": 12 })), None);
        assert_eq!(entry_timestamp(&json!({ "timestamp": "yesterday" })), None);
    }
}
