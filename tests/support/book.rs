use chrono::Utc;
use rust_decimal::Decimal;

use spreadwatch::domain::{OrderBook, PriceLevel, TradingPair, VenueId};

pub fn btc_usd() -> TradingPair {
    TradingPair::new("BTC", "USD").unwrap()
}

pub fn eth_usd() -> TradingPair {
    TradingPair::new("ETH", "USD").unwrap()
}

pub fn make_book(venue: &str, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> OrderBook {
    OrderBook::new(
        VenueId::from(venue),
        btc_usd(),
        Utc::now(),
        bids.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect(),
        asks.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect(),
    )
}

/// One level per side.
pub fn top_book(
    venue: &str,
    bid: Decimal,
    bid_qty: Decimal,
    ask: Decimal,
    ask_qty: Decimal,
) -> OrderBook {
    make_book(venue, &[(bid, bid_qty)], &[(ask, ask_qty)])
}
