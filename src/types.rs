use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decimal places kept for a computed spread. Well inside the 1e-9 tolerance
/// consumers recompute against, and stable through a NUMERIC column.
const PERCENTAGE_SCALE: i64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    /// Canonical `BASE/QUOTE` identifier.
    pub id: String,
    pub base: String,
    pub quote: String,
    /// Display name of the base currency.
    pub name: String,
}

impl Symbol {
    pub fn new(base: &str, quote: &str) -> Self {
        let base = base.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();
        Self {
            id: format!("{}/{}", base, quote),
            name: base.clone(),
            base,
            quote,
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        let (base, quote) = id.split_once('/')?;
        if base.trim().is_empty() || quote.trim().is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }
}

/// One exchange's top of book for one symbol, valid for a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeQuote {
    pub exchange_id: String,
    pub bid_price: BigDecimal,
    pub ask_price: BigDecimal,
    pub observed_at: DateTime<Utc>,
}

/// A spot market as listed by one exchange, with its trading fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: Symbol,
    /// The exchange's own market identifier (`BTCUSDT`, `BTC-USDT`, ...).
    pub native_symbol: String,
    pub taker_fee: Option<BigDecimal>,
    pub maker_fee: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalNetwork {
    pub network: String,
    pub fee: BigDecimal,
    pub active: bool,
    pub withdraw_enabled: bool,
}

impl WithdrawalNetwork {
    pub fn is_usable(&self) -> bool {
        self.active && self.withdraw_enabled
    }
}

/// Price on one side of a spread, before exchange names are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSide {
    pub exchange_id: String,
    pub price: BigDecimal,
}

/// Output of the spread analysis for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadCandidate {
    pub symbol: Symbol,
    pub exchange_min: QuoteSide,
    pub exchange_max: QuoteSide,
    pub percentage_difference: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePrice {
    pub id: String,
    pub name: String,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinSideFees {
    pub taker_fee: Option<BigDecimal>,
    pub maker_fee: Option<BigDecimal>,
    pub withdrawal_fee_asset: Option<BigDecimal>,
    pub withdrawal_network: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxSideFees {
    pub taker_fee: Option<BigDecimal>,
    pub maker_fee: Option<BigDecimal>,
}

/// A persisted cross-exchange spread. Never mutated after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub symbol: String,
    pub symbol_name: String,
    pub exchange_min: ExchangePrice,
    pub exchange_max: ExchangePrice,
    pub percentage_difference: BigDecimal,
    pub fees_min: MinSideFees,
    pub fees_max: MaxSideFees,
    pub computed_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(
        symbol: &Symbol,
        exchange_min: ExchangePrice,
        exchange_max: ExchangePrice,
        percentage_difference: BigDecimal,
        fees_min: MinSideFees,
        fees_max: MaxSideFees,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.id.clone(),
            symbol_name: symbol.name.clone(),
            exchange_min,
            exchange_max,
            percentage_difference,
            fees_min,
            fees_max,
            // Postgres keeps microseconds; truncate so a stored record reads back identical.
            computed_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn formatted_percentage(&self) -> String {
        format_percentage(&self.percentage_difference)
    }
}

/// `(max - min) / min * 100`, or `None` when `min` is not positive.
pub fn percentage_difference(min_price: &BigDecimal, max_price: &BigDecimal) -> Option<BigDecimal> {
    if *min_price <= BigDecimal::from(0) {
        return None;
    }
    let spread = (max_price - min_price) / min_price * BigDecimal::from(100);
    Some(spread.round(PERCENTAGE_SCALE))
}

pub fn format_percentage(value: &BigDecimal) -> String {
    format!("{}%", value.round(2).with_scale(2))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinFeesEvent {
    pub taker_fee: Option<f64>,
    pub maker_fee: Option<f64>,
    pub withdrawal_fee_asset: Option<f64>,
    pub withdrawal_network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxFeesEvent {
    pub taker_fee: Option<f64>,
    pub maker_fee: Option<f64>,
}

/// Wire shape pushed to stream subscribers and returned by the top-opportunities query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityEvent {
    pub symbol: String,
    pub symbol_name: String,
    pub exchange_min_id: String,
    pub exchange_min_name: String,
    #[serde(rename = "price_at_exMin_to_buy_asset")]
    pub price_at_ex_min_to_buy_asset: f64,
    pub exchange_max_id: String,
    pub exchange_max_name: String,
    #[serde(rename = "price_at_exMax_to_sell_asset")]
    pub price_at_ex_max_to_sell_asset: f64,
    pub percentage_difference: String,
    #[serde(rename = "fees_exMin")]
    pub fees_ex_min: MinFeesEvent,
    #[serde(rename = "fees_exMax")]
    pub fees_ex_max: MaxFeesEvent,
    pub timestamp: DateTime<Utc>,
    pub analysis_id: Uuid,
}

fn as_f64(value: &Option<BigDecimal>) -> Option<f64> {
    value.as_ref().and_then(|v| v.to_f64())
}

impl From<&Opportunity> for OpportunityEvent {
    fn from(opportunity: &Opportunity) -> Self {
        Self {
            symbol: opportunity.symbol.clone(),
            symbol_name: opportunity.symbol_name.clone(),
            exchange_min_id: opportunity.exchange_min.id.clone(),
            exchange_min_name: opportunity.exchange_min.name.clone(),
            price_at_ex_min_to_buy_asset: opportunity.exchange_min.price.to_f64().unwrap_or(0.0),
            exchange_max_id: opportunity.exchange_max.id.clone(),
            exchange_max_name: opportunity.exchange_max.name.clone(),
            price_at_ex_max_to_sell_asset: opportunity.exchange_max.price.to_f64().unwrap_or(0.0),
            percentage_difference: opportunity.formatted_percentage(),
            fees_ex_min: MinFeesEvent {
                taker_fee: as_f64(&opportunity.fees_min.taker_fee),
                maker_fee: as_f64(&opportunity.fees_min.maker_fee),
                withdrawal_fee_asset: as_f64(&opportunity.fees_min.withdrawal_fee_asset),
                withdrawal_network: opportunity.fees_min.withdrawal_network.clone(),
            },
            fees_ex_max: MaxFeesEvent {
                taker_fee: as_f64(&opportunity.fees_max.taker_fee),
                maker_fee: as_f64(&opportunity.fees_max.maker_fee),
            },
            timestamp: opportunity.computed_at,
            analysis_id: opportunity.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn create_test_opportunity() -> Opportunity {
        Opportunity::new(
            &Symbol::new("x", "usdt"),
            ExchangePrice { id: "a".into(), name: "A".into(), price: dec("100") },
            ExchangePrice { id: "b".into(), name: "B".into(), price: dec("102") },
            percentage_difference(&dec("100"), &dec("102")).unwrap(),
            MinSideFees {
                taker_fee: Some(dec("0.001")),
                maker_fee: Some(dec("0.001")),
                withdrawal_fee_asset: None,
                withdrawal_network: None,
            },
            MaxSideFees::default(),
        )
    }

    #[test]
    fn test_symbol_parse() {
        let symbol = Symbol::parse("btc/usdt").unwrap();
        assert_eq!(symbol.id, "BTC/USDT");
        assert_eq!(symbol.base, "BTC");
        assert_eq!(symbol.quote, "USDT");
        assert!(Symbol::parse("BTCUSDT").is_none());
        assert!(Symbol::parse("/USDT").is_none());
    }

    #[test]
    fn test_percentage_difference() {
        let pct = percentage_difference(&dec("100"), &dec("102")).unwrap();
        assert_eq!(pct, dec("2"));
        assert_eq!(format_percentage(&pct), "2.00%");

        assert!(percentage_difference(&dec("0"), &dec("102")).is_none());
        assert!(percentage_difference(&dec("-1"), &dec("102")).is_none());
    }

    #[test]
    fn test_percentage_recomputable_within_tolerance() {
        let min = dec("0.0003127");
        let max = dec("0.0003311");
        let pct = percentage_difference(&min, &max).unwrap();
        let exact = (&max - &min) / &min * BigDecimal::from(100);
        assert!((pct - exact).abs() < dec("0.000000001"));
    }

    #[test]
    fn test_event_wire_shape() {
        let opportunity = create_test_opportunity();
        let event = OpportunityEvent::from(&opportunity);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["symbol"], "X/USDT");
        assert_eq!(json["exchange_min_id"], "a");
        assert_eq!(json["price_at_exMin_to_buy_asset"], 100.0);
        assert_eq!(json["price_at_exMax_to_sell_asset"], 102.0);
        assert_eq!(json["percentage_difference"], "2.00%");
        assert_eq!(json["fees_exMin"]["taker_fee"], 0.001);
        assert!(json["fees_exMin"]["withdrawal_network"].is_null());
        assert!(json["fees_exMax"]["maker_fee"].is_null());
        assert_eq!(json["analysis_id"], opportunity.id.to_string());
    }

    #[test]
    fn test_opportunity_json_round_trip() {
        let opportunity = create_test_opportunity();
        let json = serde_json::to_string(&opportunity).unwrap();
        let decoded: Opportunity = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, opportunity);
    }
}
